//! 精确十进制金额
//!
//! 金额内部统一以主单位（元、欧元）的 `Decimal` 保存，精度标记只决定构造时的解释方式
//! 和运算结果是否需要舍入到最小货币单位。

use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("币种不一致: {left} 与 {right}")]
    CurrencyMismatch { left: String, right: String },

    #[error("金额溢出: {currency}")]
    Overflow { currency: String },
}

/// 金额精度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 以最小货币单位计的整数金额
    Cent,
    /// 任意小数位的主单位金额
    Decimal,
}

/// 舍入模式，只影响恰好落在中点上的值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// 银行家舍入：中点取偶数
    #[default]
    HalfEven,
    /// 中点远离零
    HalfUp,
    /// 中点趋向零
    HalfDown,
}

impl RoundingMode {
    fn strategy(self) -> RoundingStrategy {
        match self {
            Self::HalfEven => RoundingStrategy::MidpointNearestEven,
            Self::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            Self::HalfDown => RoundingStrategy::MidpointTowardZero,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HalfEven => "ROUND_HALF_EVEN",
            Self::HalfUp => "ROUND_HALF_UP",
            Self::HalfDown => "ROUND_HALF_DOWN",
        }
    }
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HALF_EVEN" | "ROUND_HALF_EVEN" => Ok(Self::HalfEven),
            "HALF_UP" | "ROUND_HALF_UP" => Ok(Self::HalfUp),
            "HALF_DOWN" | "ROUND_HALF_DOWN" => Ok(Self::HalfDown),
            other => Err(format!("未知的舍入模式: {}", other)),
        }
    }
}

impl fmt::Display for RoundingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 币种的最小单位小数位数（ISO 4217）
pub fn fraction_digits(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "CLP" | "ISK" | "VND" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" => 3,
        _ => 2,
    }
}

/// 商业平台的 centPrecision 金额结构
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CentPrecisionMoney {
    #[serde(rename = "type")]
    pub money_type: &'static str,
    pub currency_code: String,
    pub cent_amount: i64,
    pub fraction_digits: u32,
}

/// 不可变金额值
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Money {
    amount: Decimal,
    currency: String,
    precision: Precision,
    rounding: RoundingMode,
}

impl Money {
    /// 构造金额
    ///
    /// `Precision::Cent` 时 `amount` 为最小单位数量，`Precision::Decimal` 时为主单位金额。
    /// 非整数的最小单位数量原样保留，取整时按 `rounded_with` 指定的模式舍入。
    pub fn of(precision: Precision, currency: impl Into<String>, amount: Decimal) -> Self {
        let currency = currency.into();
        let amount = match precision {
            Precision::Cent => amount / Decimal::from(10_i64.pow(fraction_digits(&currency))),
            Precision::Decimal => amount,
        };

        Self {
            amount,
            currency,
            precision,
            rounding: RoundingMode::default(),
        }
    }

    /// 指定后续运算使用的舍入模式
    pub fn rounded_with(mut self, rounding: RoundingMode) -> Self {
        self.rounding = rounding;
        self
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// 主单位金额
    pub fn to_decimal(&self) -> Decimal {
        self.amount
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }

    pub fn negate(&self) -> Self {
        Self {
            amount: -self.amount,
            ..self.clone()
        }
    }

    pub fn add(&self, other: &Money, result_precision: Precision) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let raw = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| self.overflow())?;
        Ok(self.with_result(raw, result_precision))
    }

    pub fn subtract(
        &self,
        other: &Money,
        result_precision: Precision,
    ) -> Result<Money, MoneyError> {
        self.ensure_same_currency(other)?;
        let raw = self
            .amount
            .checked_sub(other.amount)
            .ok_or_else(|| self.overflow())?;
        Ok(self.with_result(raw, result_precision))
    }

    /// 最小单位整数金额，小数精度的值按当前舍入模式舍入
    pub fn cent_amount(&self) -> Result<i64, MoneyError> {
        let digits = fraction_digits(&self.currency);
        let mut rounded = self
            .amount
            .round_dp_with_strategy(digits, self.rounding.strategy());
        rounded.rescale(digits);
        i64::try_from(rounded.mantissa()).map_err(|_| self.overflow())
    }

    pub fn to_cent_precision(&self) -> Result<CentPrecisionMoney, MoneyError> {
        Ok(CentPrecisionMoney {
            money_type: "centPrecision",
            currency_code: self.currency.clone(),
            cent_amount: self.cent_amount()?,
            fraction_digits: fraction_digits(&self.currency),
        })
    }

    fn with_result(&self, raw: Decimal, precision: Precision) -> Money {
        let amount = match precision {
            Precision::Cent => raw.round_dp_with_strategy(
                fraction_digits(&self.currency),
                self.rounding.strategy(),
            ),
            Precision::Decimal => raw,
        };

        Money {
            amount,
            currency: self.currency.clone(),
            precision,
            rounding: self.rounding,
        }
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), MoneyError> {
        if self.currency != other.currency {
            return Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            });
        }
        Ok(())
    }

    fn overflow(&self) -> MoneyError {
        MoneyError::Overflow {
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
