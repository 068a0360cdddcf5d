//! 促销转换回放工具
//!
//! 使用录制的促销引擎响应重放一次 API 扩展调用，输出转换结果，用于复现线上问题。
//!
//! 录制文件格式：
//! `{ "event": {...}, "responses": { "session": { "EUR": {...} }, "profile": { "EUR": {...} } } }`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use promo_shared::config::AppConfig;
use promo_shared::observability::{self, ObservabilityConfig};
use promotion_translator::engine::RecordedEngine;
use promotion_translator::ExtensionProcessor;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

const SERVICE_NAME: &str = "promo-replay";

#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "Replay a promotion translation from recorded engine responses")]
struct Cli {
    /// 录制文件路径
    fixture: PathBuf,

    /// 以紧凑格式输出 JSON
    #[arg(long)]
    compact: bool,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    event: Value,
    #[serde(default)]
    responses: RecordedEngine,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).context("加载配置失败")?;
    observability::init(&ObservabilityConfig::from_logging(
        &config.service_name,
        &config.logging,
    ))?;

    let raw = std::fs::read_to_string(&cli.fixture)
        .with_context(|| format!("读取录制文件失败: {}", cli.fixture.display()))?;
    let fixture: Fixture = serde_json::from_str(&raw).context("录制文件格式无效")?;

    let processor =
        ExtensionProcessor::from_config(Arc::new(fixture.responses), &config.promotion)?;

    info!(fixture = %cli.fixture.display(), "开始回放");
    let outcome = processor.handle(&fixture.event).await;

    let output = if cli.compact {
        serde_json::to_string(&outcome)?
    } else {
        serde_json::to_string_pretty(&outcome)?
    };
    println!("{}", output);

    Ok(())
}
