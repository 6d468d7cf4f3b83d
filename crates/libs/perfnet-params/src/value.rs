//! Dynamically typed parameter values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Map from parameter names to values.
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Map from environment variable names to values.
pub type EnvMap = BTreeMap<String, String>;

/// Value of a runner parameter.
///
/// Parameter maps are deliberately schema-less so that the resolver does not need to
/// know about any specific tool. Each runner interprets the values it understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    /// Integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// String value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value),
            _ => None,
        }
    }

    /// List items, if this is a list.
    pub fn as_list(&self) -> Option<&[ParamValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Name of the value's type for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
        }
    }
}

impl fmt::Display for ParamValue {
    /// Formats the value as it appears on a command line.
    ///
    /// Floats use two decimals and list items are joined with commas.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:.2}"),
            Self::Str(value) => f.write_str(value),
            Self::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn test_from_toml() {
        let params = toml::from_str::<ParamMap>(indoc! {r#"
            iterations = 1000
            ib_dev = "mlx5_0"
            cpu_freq = 2.5
            use_event = true
            allow_pci = ["0000:01:00.0", "0000:01:00.1"]
        "#})
        .unwrap();
        assert_eq!(params["iterations"], ParamValue::Int(1000));
        assert_eq!(params["ib_dev"], ParamValue::from("mlx5_0"));
        assert_eq!(params["cpu_freq"], ParamValue::Float(2.5));
        assert_eq!(params["use_event"], ParamValue::Bool(true));
        assert_eq!(
            params["allow_pci"],
            ParamValue::from(vec!["0000:01:00.0", "0000:01:00.1"])
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(ParamValue::Float(2.0).to_string(), "2.00");
        assert_eq!(ParamValue::Float(3.14159).to_string(), "3.14");
        assert_eq!(ParamValue::Int(-4).to_string(), "-4");
        assert_eq!(ParamValue::from(vec![0, 1, 2]).to_string(), "0,1,2");
    }
}
