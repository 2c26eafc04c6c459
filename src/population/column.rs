use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::{CircuitError, Result};

/// A single query or node set value.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Boolean literal.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Floating point literal.
    Float(f64),
    /// String literal.
    Str(String),
}

impl Scalar {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(v) => Some(*v as f64),
            Scalar::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// Required value of one attribute: a single value or any of several.
///
/// An empty list applies no filter.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// Any of the listed values.
    Many(Vec<Scalar>),
    /// Exactly this value.
    One(Scalar),
}

impl QueryValue {
    /// Values as a slice.
    pub fn values(&self) -> &[Scalar] {
        match self {
            QueryValue::Many(values) => values,
            QueryValue::One(value) => std::slice::from_ref(value),
        }
    }
}

impl From<Scalar> for QueryValue {
    fn from(value: Scalar) -> Self {
        QueryValue::One(value)
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::One(value.into())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::One(value.into())
    }
}

impl<T: Into<Scalar>> FromIterator<T> for QueryValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        QueryValue::Many(iter.into_iter().map(Into::into).collect())
    }
}

/// Conjunction of attribute predicates.
pub type Query = BTreeMap<String, QueryValue>;

/// Attribute values of a set of records.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// Single precision floats.
    Float32(Vec<f32>),
    /// Double precision floats.
    Float64(Vec<f64>),
    /// Signed integers.
    Int64(Vec<i64>),
    /// Free-form strings.
    Str(Vec<String>),
    /// Dictionary encoded strings.
    Category {
        /// Index into `categories`, one per record.
        codes: Vec<u32>,
        /// Dictionary.
        categories: Vec<String>,
    },
}

impl Column {
    /// Number of records.
    pub fn len(&self) -> usize {
        match self {
            Column::Float32(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Int64(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Category { codes, .. } => codes.len(),
        }
    }

    /// True when the column holds no record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Data type name, using the dataframe vocabulary exposed by the service.
    pub fn dtype(&self) -> &'static str {
        match self {
            Column::Float32(_) => "float32",
            Column::Float64(_) => "float64",
            Column::Int64(_) => "int64",
            Column::Str(_) => "object",
            Column::Category { .. } => "category",
        }
    }

    /// An empty column with the same type (and dictionary).
    pub fn empty_like(&self) -> Column {
        self.take(&[])
    }

    /// Records at the given positions, in that order.
    pub fn take(&self, positions: &[usize]) -> Column {
        fn pick<T: Clone>(values: &[T], positions: &[usize]) -> Vec<T> {
            positions.iter().map(|&p| values[p].clone()).collect()
        }
        match self {
            Column::Float32(v) => Column::Float32(pick(v, positions)),
            Column::Float64(v) => Column::Float64(pick(v, positions)),
            Column::Int64(v) => Column::Int64(pick(v, positions)),
            Column::Str(v) => Column::Str(pick(v, positions)),
            Column::Category { codes, categories } => Column::Category {
                codes: pick(codes, positions),
                categories: categories.clone(),
            },
        }
    }

    /// Records whose mask entry is true.
    pub fn filter(&self, mask: &[bool]) -> Column {
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(pos, &keep)| keep.then_some(pos))
            .collect();
        self.take(&positions)
    }

    /// Per-record membership in `values`. An empty slice matches everything.
    pub fn matches(&self, values: &[Scalar]) -> Vec<bool> {
        if values.is_empty() {
            return vec![true; self.len()];
        }
        match self {
            Column::Float32(v) => v
                .iter()
                .map(|&x| numeric_member(f64::from(x), values))
                .collect(),
            Column::Float64(v) => v.iter().map(|&x| numeric_member(x, values)).collect(),
            Column::Int64(v) => v
                .iter()
                .map(|&x| {
                    values.iter().any(|value| match value {
                        Scalar::Int(i) => *i == x,
                        Scalar::Float(f) => *f == x as f64,
                        _ => false,
                    })
                })
                .collect(),
            Column::Str(v) => v.iter().map(|x| string_member(x, values)).collect(),
            Column::Category { codes, categories } => {
                let hits: Vec<bool> = categories
                    .iter()
                    .map(|category| string_member(category, values))
                    .collect();
                codes
                    .iter()
                    .map(|&code| hits.get(code as usize).copied().unwrap_or(false))
                    .collect()
            }
        }
    }

    /// JSON value of one record.
    pub fn value(&self, row: usize) -> Value {
        match self {
            Column::Float32(v) => float_value(f64::from(v[row])),
            Column::Float64(v) => float_value(v[row]),
            Column::Int64(v) => Value::from(v[row]),
            Column::Str(v) => Value::from(v[row].clone()),
            Column::Category { codes, categories } => categories
                .get(codes[row] as usize)
                .map(|s| Value::from(s.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// Dictionary of a categorical column.
    pub fn categories(&self) -> Option<&[String]> {
        match self {
            Column::Category { categories, .. } => Some(categories),
            _ => None,
        }
    }

    /// Sorted distinct values of a string column.
    pub fn distinct_strings(&self) -> Option<Vec<String>> {
        match self {
            Column::Str(v) => Some(
                v.iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Converts numeric columns to single precision.
    pub fn into_float32(self) -> Column {
        match self {
            Column::Float64(v) => Column::Float32(v.into_iter().map(|x| x as f32).collect()),
            Column::Int64(v) => Column::Float32(v.into_iter().map(|x| x as f32).collect()),
            other => other,
        }
    }

    /// Dictionary encodes string columns, with sorted categories.
    ///
    /// Numeric columns are left untouched.
    pub fn into_category(self) -> Column {
        match self {
            Column::Str(values) => {
                let categories: Vec<String> = values
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let codes = values
                    .iter()
                    .map(|value| {
                        categories
                            .binary_search(value)
                            .map(|pos| pos as u32)
                            .unwrap_or(0)
                    })
                    .collect();
                Column::Category { codes, categories }
            }
            other => other,
        }
    }

    /// Decodes a categorical column into strings.
    pub fn into_strings(self) -> Column {
        match self {
            Column::Category { codes, categories } => Column::Str(
                codes
                    .iter()
                    .map(|&code| categories.get(code as usize).cloned().unwrap_or_default())
                    .collect(),
            ),
            other => other,
        }
    }

    /// Concatenates columns of the same type.
    ///
    /// Categorical columns sharing a dictionary stay categorical; otherwise they
    /// are decoded.
    pub fn concat(columns: Vec<Column>) -> Result<Column> {
        let mut iter = columns.into_iter();
        let Some(first) = iter.next() else {
            return Err(CircuitError::invalid("cannot concatenate zero columns"));
        };
        iter.try_fold(first, |acc, next| acc.append(next))
    }

    fn append(self, other: Column) -> Result<Column> {
        Ok(match (self, other) {
            (Column::Float32(mut a), Column::Float32(b)) => {
                a.extend(b);
                Column::Float32(a)
            }
            (Column::Float64(mut a), Column::Float64(b)) => {
                a.extend(b);
                Column::Float64(a)
            }
            (Column::Int64(mut a), Column::Int64(b)) => {
                a.extend(b);
                Column::Int64(a)
            }
            (Column::Str(mut a), Column::Str(b)) => {
                a.extend(b);
                Column::Str(a)
            }
            (
                Column::Category {
                    codes: mut a,
                    categories,
                },
                Column::Category {
                    codes: b,
                    categories: other_categories,
                },
            ) if categories == other_categories => {
                a.extend(b);
                Column::Category {
                    codes: a,
                    categories,
                }
            }
            (a @ (Column::Category { .. } | Column::Str(_)), b @ (Column::Category { .. } | Column::Str(_))) => {
                a.into_strings().append(b.into_strings())?
            }
            (a, b) => {
                return Err(CircuitError::circuit(format!(
                    "cannot concatenate {} and {} columns",
                    a.dtype(),
                    b.dtype()
                )))
            }
        })
    }
}

fn numeric_member(x: f64, values: &[Scalar]) -> bool {
    values.iter().filter_map(Scalar::as_f64).any(|v| v == x)
}

fn string_member(x: &str, values: &[Scalar]) -> bool {
    values.iter().filter_map(Scalar::as_str).any(|v| v == x)
}

fn float_value(x: f64) -> Value {
    Number::from_f64(x).map(Value::Number).unwrap_or(Value::Null)
}
