use indexmap::IndexMap;

use crate::importance::Direction;

/// Feature name to a plain-language description of how it drives consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverCatalog {
    entries: IndexMap<String, String>,
}

impl Default for DriverCatalog {
    fn default() -> Self {
        let entries = [
            (
                "RH_6",
                "Outdoor humidity (RH_6) directly affects HVAC equipment operation and dehumidification loads",
            ),
            (
                "Visibility",
                "Visibility correlates with cloud cover; lower visibility means more artificial lighting and less solar cooling",
            ),
            (
                "Tdewpoint",
                "Dew point temperature indicates atmospheric moisture; higher values increase HVAC energy consumption",
            ),
            (
                "rv1",
                "Solar radiation (rv1) directly influences building cooling and heating demands",
            ),
            (
                "Windspeed",
                "Wind speed affects heat transfer through the building envelope and infiltration losses",
            ),
            (
                "hour",
                "Hour of day captures occupancy and scheduled equipment cycles",
            ),
            (
                "hour_sin",
                "Sine of the hour encodes the daily cycle of building activity",
            ),
            (
                "hour_cos",
                "Cosine of the hour encodes the daily cycle of building activity",
            ),
            (
                "T_out",
                "Outdoor temperature drives heating and cooling demand",
            ),
            (
                "RH_out",
                "Outdoor humidity changes the latent load on ventilation",
            ),
            (
                "T_out_lag1",
                "Outdoor temperature ten minutes earlier reflects the building's thermal inertia",
            ),
            (
                "RH_out_lag1",
                "Outdoor humidity ten minutes earlier reflects lagged ventilation load",
            ),
            (
                "Press_mm_hg",
                "Pressure changes correlate with weather effects on energy usage",
            ),
        ]
        .into_iter()
        .map(|(name, text)| (name.to_string(), text.to_string()))
        .collect();
        Self { entries }
    }
}

impl DriverCatalog {
    /// Empty catalog; every feature then gets the generic sentence.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Adds or replaces entries.
    #[must_use]
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (String, String)>) -> Self {
        self.entries.extend(overrides);
        self
    }

    /// Catalog entry, if any.
    #[must_use]
    pub fn get(&self, feature: &str) -> Option<&str> {
        self.entries.get(feature).map(String::as_str)
    }

    /// Catalog entry or a sentence derived from the coefficient direction.
    #[must_use]
    pub fn describe(&self, feature: &str, direction: Direction) -> String {
        self.get(feature).map_or_else(
            || match direction {
                Direction::Increases => {
                    format!("Higher {feature} increases predicted energy consumption")
                }
                Direction::Decreases => {
                    format!("Higher {feature} decreases predicted energy consumption")
                }
                Direction::Neutral => {
                    format!("{feature} has no measurable effect on predicted energy consumption")
                }
            },
            ToString::to_string,
        )
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
