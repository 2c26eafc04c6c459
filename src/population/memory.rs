use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Column, NodePopulation, Selection};
use crate::error::{CircuitError, Result};

/// On-disk nodes file: every population stored in one JSON document.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodesDocument {
    /// Populations by name.
    pub populations: BTreeMap<String, PopulationDocument>,
}

impl NodesDocument {
    /// Reads a nodes file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes a nodes file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Serialized form of one population.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct PopulationDocument {
    /// Number of records.
    pub size: usize,
    /// Plain attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, ColumnDocument>,
    /// Dictionary encoded attributes.
    #[serde(default)]
    pub enumerations: BTreeMap<String, EnumerationDocument>,
    /// Dynamics attributes, by unprefixed name.
    #[serde(default)]
    pub dynamics: BTreeMap<String, ColumnDocument>,
}

/// Serialized plain column.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum ColumnDocument {
    /// `float32` values.
    Float32(Vec<f32>),
    /// `float64` values.
    Float64(Vec<f64>),
    /// `int64` values.
    Int64(Vec<i64>),
    /// String values.
    String(Vec<String>),
}

impl From<ColumnDocument> for Column {
    fn from(doc: ColumnDocument) -> Self {
        match doc {
            ColumnDocument::Float32(v) => Column::Float32(v),
            ColumnDocument::Float64(v) => Column::Float64(v),
            ColumnDocument::Int64(v) => Column::Int64(v),
            ColumnDocument::String(v) => Column::Str(v),
        }
    }
}

impl ColumnDocument {
    fn from_column(column: Column) -> Self {
        match column {
            Column::Float32(v) => ColumnDocument::Float32(v),
            Column::Float64(v) => ColumnDocument::Float64(v),
            Column::Int64(v) => ColumnDocument::Int64(v),
            other => match other.into_strings() {
                Column::Str(v) => ColumnDocument::String(v),
                _ => ColumnDocument::String(Vec::new()),
            },
        }
    }
}

/// Serialized enumeration: codes plus dictionary.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct EnumerationDocument {
    /// One dictionary index per record.
    pub codes: Vec<u32>,
    /// Dictionary.
    pub values: Vec<String>,
}

/// A node population held entirely in memory.
#[derive(Clone, Debug)]
pub struct InMemoryPopulation {
    name: String,
    size: usize,
    attributes: BTreeMap<String, Column>,
    dynamics: BTreeMap<String, Column>,
}

impl InMemoryPopulation {
    /// Creates an attribute-less population of `size` records.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            attributes: BTreeMap::new(),
            dynamics: BTreeMap::new(),
        }
    }

    /// Adds an attribute; a [`Column::Category`] becomes an enumeration.
    pub fn with_attribute(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        self.check_len(&name, &column)?;
        self.attributes.insert(name, column);
        Ok(self)
    }

    /// Adds a dynamics attribute, by unprefixed name.
    pub fn with_dynamics(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        self.check_len(&name, &column)?;
        self.dynamics.insert(name, column);
        Ok(self)
    }

    /// Builds a population from its serialized form.
    pub fn from_document(name: impl Into<String>, doc: PopulationDocument) -> Result<Self> {
        let mut population = Self::new(name, doc.size);
        for (attr, column) in doc.attributes {
            population = population.with_attribute(attr, column.into())?;
        }
        for (attr, enumeration) in doc.enumerations {
            if let Some(&code) = enumeration
                .codes
                .iter()
                .find(|&&code| code as usize >= enumeration.values.len())
            {
                return Err(CircuitError::circuit(format!(
                    "Enumeration {attr} of population {} has invalid code {code}",
                    population.name
                )));
            }
            population = population.with_attribute(
                attr,
                Column::Category {
                    codes: enumeration.codes,
                    categories: enumeration.values,
                },
            )?;
        }
        for (attr, column) in doc.dynamics {
            population = population.with_dynamics(attr, column.into())?;
        }
        Ok(population)
    }

    /// Serialized form of this population.
    pub fn to_document(&self) -> PopulationDocument {
        let mut doc = PopulationDocument {
            size: self.size,
            ..PopulationDocument::default()
        };
        for (name, column) in &self.attributes {
            match column {
                Column::Category { codes, categories } => {
                    doc.enumerations.insert(
                        name.clone(),
                        EnumerationDocument {
                            codes: codes.clone(),
                            values: categories.clone(),
                        },
                    );
                }
                other => {
                    doc.attributes
                        .insert(name.clone(), ColumnDocument::from_column(other.clone()));
                }
            }
        }
        for (name, column) in &self.dynamics {
            doc.dynamics
                .insert(name.clone(), ColumnDocument::from_column(column.clone()));
        }
        doc
    }

    fn check_len(&self, attr: &str, column: &Column) -> Result<()> {
        if column.len() != self.size {
            return Err(CircuitError::circuit(format!(
                "Attribute {attr} of population {} has {} values, expected {}",
                self.name,
                column.len(),
                self.size
            )));
        }
        Ok(())
    }

    fn gather(&self, column: &Column, selection: &Selection) -> Result<Column> {
        selection.check_bounds(&self.name, self.size)?;
        Ok(match selection {
            Selection::Range(range) if range.start == 0 && range.end == self.size => column.clone(),
            other => column.take(&other.to_ids()),
        })
    }

    fn attribute(&self, name: &str) -> Result<&Column> {
        self.attributes
            .get(name)
            .ok_or_else(|| CircuitError::attribute_not_found(&self.name, name))
    }
}

impl NodePopulation for InMemoryPopulation {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.size
    }

    fn attribute_names(&self) -> BTreeSet<String> {
        self.attributes.keys().cloned().collect()
    }

    fn enumeration_names(&self) -> BTreeSet<String> {
        self.attributes
            .iter()
            .filter(|(_, column)| matches!(column, Column::Category { .. }))
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn dynamics_attribute_names(&self) -> BTreeSet<String> {
        self.dynamics.keys().cloned().collect()
    }

    fn get_attribute(&self, name: &str, selection: &Selection) -> Result<Column> {
        let column = self.attribute(name)?;
        Ok(self.gather(column, selection)?.into_strings())
    }

    fn get_enumeration(&self, name: &str, selection: &Selection) -> Result<Vec<u32>> {
        match self.gather(self.attribute(name)?, selection)? {
            Column::Category { codes, .. } => Ok(codes),
            _ => Err(CircuitError::circuit(format!(
                "Attribute {name} of population {} is not an enumeration",
                self.name
            ))),
        }
    }

    fn enumeration_values(&self, name: &str) -> Result<Vec<String>> {
        self.attribute(name)?
            .categories()
            .map(<[String]>::to_vec)
            .ok_or_else(|| {
                CircuitError::circuit(format!(
                    "Attribute {name} of population {} is not an enumeration",
                    self.name
                ))
            })
    }

    fn get_dynamics_attribute(&self, name: &str, selection: &Selection) -> Result<Column> {
        let column = self
            .dynamics
            .get(name)
            .ok_or_else(|| CircuitError::attribute_not_found(&self.name, name))?;
        self.gather(column, selection)
    }
}
