//! Listing records and the property-type category

use serde::{Deserialize, Serialize};
use std::fmt;

/// Property category as coded in the source data (`h`, `t`, `u`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    House,
    Townhouse,
    Unit,
}

impl PropertyType {
    /// All categories in label-encoding order
    pub const ALL: [PropertyType; 3] = [Self::House, Self::Townhouse, Self::Unit];

    /// The category every indicator column is relative to
    pub const REFERENCE: PropertyType = Self::House;

    /// Single-letter code used in the CSV and in requests
    pub fn code(self) -> &'static str {
        match self {
            Self::House => "h",
            Self::Townhouse => "t",
            Self::Unit => "u",
        }
    }

    /// Parse a CSV/request code. Only the exact codes are recognized.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "h" => Some(Self::House),
            "t" => Some(Self::Townhouse),
            "u" => Some(Self::Unit),
            _ => None,
        }
    }

    /// Ordinal label (alphabetical by code)
    pub fn label(self) -> u8 {
        match self {
            Self::House => 0,
            Self::Townhouse => 1,
            Self::Unit => 2,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One cleaned row of the listing dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub rooms: u32,
    pub property_type: PropertyType,
    pub postcode: u32,
    /// Distance to the CBD in kilometres
    pub distance: f64,
    pub price: f64,
}

impl Listing {
    pub fn new(rooms: u32, property_type: PropertyType, postcode: u32, distance: f64, price: f64) -> Self {
        Self {
            rooms,
            property_type,
            postcode,
            distance,
            price,
        }
    }
}

/// Numeric input columns, ordered as they appear in the CSV header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericColumn {
    Rooms,
    Postcode,
    Distance,
}

impl NumericColumn {
    pub fn name(self) -> &'static str {
        match self {
            Self::Rooms => "Rooms",
            Self::Postcode => "Postcode",
            Self::Distance => "Distance",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Rooms" => Some(Self::Rooms),
            "Postcode" => Some(Self::Postcode),
            "Distance" => Some(Self::Distance),
            _ => None,
        }
    }

    /// Raw value of this column for a listing
    pub fn value(self, rooms: u32, postcode: u32, distance: f64) -> f64 {
        match self {
            Self::Rooms => rooms as f64,
            Self::Postcode => postcode as f64,
            Self::Distance => distance,
        }
    }
}
