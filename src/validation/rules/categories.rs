//! Dictionaries that collapse free-form strings into a small set of categories.

use crate::validation::error::{ValidationError, ValidationErrorType};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

pub const DEFAULT_NA_CATEGORY: &str = "na_category";

fn default_na_category() -> String { DEFAULT_NA_CATEGORY.to_string() }

#[derive(Deserialize)]
struct RawStringCategories {
    categories: BTreeMap<String, BTreeSet<String>>,
    #[serde(default = "default_na_category")]
    na_category: String,
}

/// Categories of strings, each mapping a category name to the strings that belong to it.
///
/// Every category contains its own name and no string belongs to two categories.
/// Strings in `na_category` are categorized as null.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawStringCategories")]
pub struct StringCategories {
    categories: BTreeMap<String, BTreeSet<String>>,
    na_category: String,
}

impl TryFrom<RawStringCategories> for StringCategories {
    type Error = ValidationError;

    fn try_from(raw: RawStringCategories) -> Result<Self, Self::Error> {
        Self::with_na_category(raw.categories, raw.na_category)
    }
}

impl StringCategories {
    pub fn new(categories: BTreeMap<String, BTreeSet<String>>) -> Result<Self, ValidationError> {
        Self::with_na_category(categories, DEFAULT_NA_CATEGORY)
    }

    pub fn with_na_category(
        mut categories: BTreeMap<String, BTreeSet<String>>,
        na_category: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        for (name, values) in categories.iter_mut() {
            if values.insert(name.clone()) {
                info!("String category {} does not map to itself. Adding it.", name);
            }
        }

        let names: Vec<&String> = categories.keys().collect();
        for (i, a) in names.iter().enumerate() {
            for b in &names[i + 1..] {
                let shared: BTreeSet<&String> = categories[*a].intersection(&categories[*b]).collect();
                if !shared.is_empty() {
                    return Err(ValidationError::new(
                        "categories",
                        ValidationErrorType::Category,
                        format!("String categories are not disjoint. {} and {} both contain these values: {:?}", a, b, shared),
                    ));
                }
            }
        }

        Ok(Self { categories, na_category: na_category.into() })
    }

    pub fn categories(&self) -> &BTreeMap<String, BTreeSet<String>> { &self.categories }

    pub fn na_category(&self) -> &str { &self.na_category }

    /// Maps every categorized string to its category.
    pub fn mapping(&self) -> BTreeMap<String, String> {
        self.categories
            .iter()
            .flat_map(|(cat, values)| values.iter().map(move |v| (v.clone(), cat.clone())))
            .collect()
    }

    /// Categorizes a column of strings. Uncategorized strings and strings in the NA
    /// category become null.
    pub fn categorize<'a, I>(&self, column: &str, values: I) -> Vec<Option<String>>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mapping = self.mapping();
        let mut uncategorized = BTreeSet::new();
        let out = values
            .into_iter()
            .map(|value| {
                let value = value?;
                match mapping.get(value) {
                    Some(cat) if *cat == self.na_category => None,
                    Some(cat) => Some(cat.clone()),
                    None => {
                        uncategorized.insert(value.to_string());
                        None
                    }
                }
            })
            .collect();
        if !uncategorized.is_empty() {
            warn!("{}: Found {} uncategorized values: {:?}", column, uncategorized.len(), uncategorized);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cats(pairs: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_overlapping_categories_are_rejected() {
        let err = StringCategories::new(cats(&[("coal", &["bit", "lignite"]), ("gas", &["ng", "lignite"])])).unwrap_err();
        assert_eq!(err.error_type, ValidationErrorType::Category);
        assert!(err.message.contains("coal and gas"));
    }

    #[test]
    fn test_category_names_map_to_themselves() {
        let sc = StringCategories::new(cats(&[("coal", &["bit"])])).unwrap();
        assert_eq!(sc.mapping().get("coal").map(String::as_str), Some("coal"));
        assert_eq!(sc.mapping().get("bit").map(String::as_str), Some("coal"));
    }

    #[test]
    fn test_categorize() {
        let sc = StringCategories::new(cats(&[("coal", &["bit"]), ("na_category", &["n/a", ""])])).unwrap();
        let out = sc.categorize("fuel_type", [Some("bit"), Some("n/a"), Some("wood"), None, Some("coal")]);
        assert_eq!(out, vec![Some("coal".to_string()), None, None, None, Some("coal".to_string())]);
    }

    #[test]
    fn test_deserialize_checks_categories() {
        let sc: StringCategories = serde_json::from_str(r#"{"categories": {"gas": ["ng"]}}"#).unwrap();
        assert_eq!(sc.na_category(), DEFAULT_NA_CATEGORY);
        assert!(serde_json::from_str::<StringCategories>(r#"{"categories": {"a": ["x"], "b": ["x"]}}"#).is_err());
    }

    proptest! {
        #[test]
        fn prop_valid_categories_are_idempotent_and_disjoint(
            raw in prop::collection::btree_map("[a-d]", prop::collection::btree_set("[a-f]", 0..4), 0..4)
        ) {
            let mut augmented = raw.clone();
            for (k, vs) in augmented.iter_mut() {
                vs.insert(k.clone());
            }
            let total: usize = augmented.values().map(BTreeSet::len).sum();
            let distinct: BTreeSet<&String> = augmented.values().flatten().collect();
            let overlapping = total != distinct.len();

            match StringCategories::new(raw) {
                Ok(sc) => {
                    prop_assert!(!overlapping);
                    let mapping = sc.mapping();
                    for cat in sc.categories().keys() {
                        prop_assert_eq!(mapping.get(cat), Some(cat));
                    }
                    prop_assert_eq!(mapping.len(), total);
                }
                Err(_) => prop_assert!(overlapping),
            }
        }
    }
}
