use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CircuitError;

/// Group of attributes exported together.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    /// `x`, `y`, `z`.
    Position,
    /// `region`.
    Region,
    /// `mtype`.
    Mtype,
}

impl Modality {
    /// Every modality, in export order.
    pub const ALL: [Modality; 3] = [Modality::Position, Modality::Region, Modality::Mtype];

    /// Attributes covered by this modality.
    pub fn attributes(self) -> &'static [&'static str] {
        match self {
            Modality::Position => &["x", "y", "z"],
            Modality::Region => &["region"],
            Modality::Mtype => &["mtype"],
        }
    }

    /// Flattened attributes of `modalities`; all of them when empty.
    pub fn to_attributes(modalities: &[Modality]) -> Vec<String> {
        let modalities = if modalities.is_empty() {
            &Self::ALL[..]
        } else {
            modalities
        };
        modalities
            .iter()
            .flat_map(|m| m.attributes().iter().map(|a| a.to_string()))
            .collect()
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Modality::Position => "position",
            Modality::Region => "region",
            Modality::Mtype => "mtype",
        })
    }
}

impl FromStr for Modality {
    type Err = CircuitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" => Ok(Modality::Position),
            "region" => Ok(Modality::Region),
            "mtype" => Ok(Modality::Mtype),
            other => Err(CircuitError::invalid(format!("Unknown modality: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_means_every_modality() {
        assert_eq!(
            Modality::to_attributes(&[]),
            ["x", "y", "z", "region", "mtype"]
        );
        assert_eq!(
            Modality::to_attributes(&[Modality::Mtype, Modality::Position]),
            ["mtype", "x", "y", "z"]
        );
    }

    #[test]
    fn parses_lowercase_names() {
        assert_eq!("region".parse::<Modality>().unwrap(), Modality::Region);
        assert!("voltage".parse::<Modality>().is_err());
    }
}
