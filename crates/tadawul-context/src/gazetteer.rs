//! Known instruments and sector vocabularies
//!
//! The analyzer never talks to the network; everything it can recognise lives
//! here. A gazetteer can be loaded from JSON where every field except `symbol`
//! may be omitted.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Exchange suffix Yahoo uses for Tadawul listings
const TADAWUL_SUFFIX: &str = ".SR";

/// A listed company
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub localized_name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            localized_name: None,
            sector: None,
        }
    }

    pub fn with_localized_name(mut self, name: impl Into<String>) -> Self {
        self.localized_name = Some(name.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    /// Symbol as the quote provider expects it, e.g. `2222.SR`
    pub fn yahoo_symbol(&self) -> String {
        if self.symbol.contains('.') {
            self.symbol.clone()
        } else {
            format!("{}{TADAWUL_SUFFIX}", self.symbol)
        }
    }
}

/// Instruments plus per-sector vocabulary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gazetteer {
    #[serde(default)]
    instruments: Vec<Instrument>,
    #[serde(default)]
    sectors: BTreeMap<String, Vec<String>>,
}

impl Gazetteer {
    pub fn new(instruments: Vec<Instrument>, sectors: BTreeMap<String, Vec<String>>) -> Self {
        Self {
            instruments,
            sectors,
        }
    }

    /// Parse a gazetteer from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a gazetteer JSON file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Built-in list of large Tadawul listings
    pub fn tadawul() -> Self {
        let instruments = vec![
            Instrument::new("2222", "Saudi Aramco")
                .with_localized_name("أرامكو")
                .with_sector("Energy"),
            Instrument::new("1120", "Al Rajhi Bank")
                .with_localized_name("الراجحي")
                .with_sector("Banks"),
            Instrument::new("1180", "Saudi National Bank")
                .with_localized_name("البنك الأهلي")
                .with_sector("Banks"),
            Instrument::new("1010", "Riyad Bank")
                .with_localized_name("بنك الرياض")
                .with_sector("Banks"),
            Instrument::new("2010", "SABIC")
                .with_localized_name("سابك")
                .with_sector("Materials"),
            Instrument::new("1211", "Ma'aden")
                .with_localized_name("معادن")
                .with_sector("Materials"),
            Instrument::new("7010", "STC")
                .with_localized_name("الاتصالات السعودية")
                .with_sector("Telecommunication"),
            Instrument::new("2082", "ACWA Power").with_sector("Utilities"),
            Instrument::new("4190", "Jarir")
                .with_localized_name("جرير")
                .with_sector("Retail"),
            Instrument::new("2280", "Almarai")
                .with_localized_name("المراعي")
                .with_sector("Food & Beverages"),
            Instrument::new("4013", "Dr. Sulaiman Al Habib").with_sector("Health Care"),
        ];

        let sectors = [
            ("Energy", &["oil", "energy", "crude", "refining", "نفط", "طاقة"][..]),
            ("Banks", &["bank", "banking", "lending", "deposits", "بنك", "مصرف"][..]),
            (
                "Materials",
                &["petrochemical", "chemicals", "mining", "gold", "بتروكيماويات", "تعدين"][..],
            ),
            ("Telecommunication", &["telecom", "5g", "mobile", "اتصالات"][..]),
            ("Utilities", &["power", "utility", "renewable", "water", "كهرباء"][..]),
            ("Retail", &["retail", "stores", "consumer", "تجزئة"][..]),
            ("Food & Beverages", &["dairy", "food", "beverages", "أغذية"][..]),
            ("Health Care", &["hospital", "healthcare", "medical", "صحة"][..]),
        ]
        .into_iter()
        .map(|(sector, terms)| {
            (
                sector.to_string(),
                terms.iter().map(ToString::to_string).collect(),
            )
        })
        .collect();

        Self::new(instruments, sectors)
    }

    pub fn instruments(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Look up an instrument by ticker (with or without the `.SR` suffix)
    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        let bare = symbol.strip_suffix(TADAWUL_SUFFIX).unwrap_or(symbol);
        self.instruments
            .iter()
            .find(|i| i.symbol.eq_ignore_ascii_case(bare))
    }

    /// Vocabulary for a sector; empty when the sector is unknown
    pub fn sector_terms(&self, sector: &str) -> &[String] {
        self.sectors.get(sector).map_or(&[], Vec::as_slice)
    }

    /// All sector names
    pub fn sectors(&self) -> impl Iterator<Item = &str> {
        self.sectors.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_list() {
        let gazetteer = Gazetteer::tadawul();
        let aramco = gazetteer.get("2222").unwrap();
        assert_eq!(aramco.name, "Saudi Aramco");
        assert_eq!(aramco.sector.as_deref(), Some("Energy"));
        assert!(gazetteer.get("2222.SR").is_some());
        assert!(!gazetteer.sector_terms("Banks").is_empty());
    }

    #[test]
    fn test_yahoo_symbol() {
        assert_eq!(Instrument::new("1120", "Al Rajhi Bank").yahoo_symbol(), "1120.SR");
        assert_eq!(Instrument::new("2222.SR", "").yahoo_symbol(), "2222.SR");
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = r#"{
            "instruments": [
                {"symbol": "9999"},
                {"symbol": "4321", "name": "Example Co", "sector": "Retail"}
            ]
        }"#;

        let gazetteer = Gazetteer::from_json(json).unwrap();
        assert_eq!(gazetteer.instruments().len(), 2);
        assert_eq!(gazetteer.get("9999").unwrap().name, "");
        assert!(gazetteer.get("9999").unwrap().localized_name.is_none());
        assert!(gazetteer.sector_terms("Retail").is_empty());
    }

    #[test]
    fn test_unknown_symbol() {
        assert!(Gazetteer::tadawul().get("AAPL").is_none());
    }
}
