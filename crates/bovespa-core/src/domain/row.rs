use serde::{Deserialize, Serialize};
use time::Date;

use crate::{UtcDateTime, ValidationError};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// One security of the theoretical portfolio on one trading day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentRow {
    pub code: String,
    pub name: String,
    pub class: String,
    pub theoretical_quantity: f64,
    pub weight_percent: f64,
    #[serde(with = "iso_date")]
    pub trade_date: Date,
    pub collected_at: UtcDateTime,
}

impl ConstituentRow {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        class: impl Into<String>,
        theoretical_quantity: f64,
        weight_percent: f64,
        trade_date: Date,
        collected_at: UtcDateTime,
    ) -> Result<Self, ValidationError> {
        let code = code.into().trim().to_owned();
        if code.is_empty() {
            return Err(ValidationError::EmptyCode);
        }

        let class = class.into().trim().to_owned();
        if class.is_empty() {
            return Err(ValidationError::EmptyClass { code });
        }

        if !theoretical_quantity.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                field: "theoretical_quantity",
            });
        }
        if theoretical_quantity < 0.0 {
            return Err(ValidationError::NegativeValue {
                field: "theoretical_quantity",
            });
        }
        if !weight_percent.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                field: "weight_percent",
            });
        }

        Ok(Self {
            code,
            name: name.into().trim().to_owned(),
            class,
            theoretical_quantity,
            weight_percent,
            trade_date,
            collected_at,
        })
    }

    /// Trade date in `YYYY-MM-DD` form.
    pub fn trade_date_iso(&self) -> String {
        format_iso_date(self.trade_date)
    }
}

pub(crate) fn format_iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}
