//! Autosuggest options shared by the text and voice APIs
//!
//! Options are assembled through [`AutosuggestOptionsBuilder`] and validated once in
//! [`AutosuggestOptionsBuilder::build`], so a finished [`AutosuggestOptions`] is always
//! consistent. Clip filters are mutually exclusive: the last one configured wins.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{BoundingBox, Circle, Coordinates, Countries, Polygon};

/// Default number of autosuggest results
pub const DEFAULT_N_RESULTS: u32 = 3;

/// Largest number of results the service returns
pub const MAX_N_RESULTS: u32 = 100;

/// Geographic restriction applied to autosuggest results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClipFilter {
    Circle(Circle),
    BoundingBox(BoundingBox),
    Polygon(Polygon),
    Countries { codes: Countries },
}

impl ClipFilter {
    /// Query parameter name and value for this clip
    pub fn query_pair(&self) -> (&'static str, String) {
        match self {
            Self::Circle(circle) => ("clip-to-circle", circle.to_api_string()),
            Self::BoundingBox(bbox) => ("clip-to-bounding-box", bbox.to_api_string()),
            Self::Polygon(polygon) => ("clip-to-polygon", polygon.to_api_string()),
            Self::Countries { codes } => ("clip-to-country", codes.to_api_string()),
        }
    }

    /// Re-run the geometry checks, for filters assembled from public fields
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Circle(circle) => {
                Circle::new(check(circle.center)?, circle.radius_km)?;
            }
            Self::BoundingBox(bbox) => {
                BoundingBox::new(check(bbox.southwest)?, check(bbox.northeast)?)?;
            }
            Self::Polygon(polygon) => {
                for point in polygon.points() {
                    check(*point)?;
                }
            }
            Self::Countries { .. } => {}
        }
        Ok(())
    }
}

fn check(point: Coordinates) -> Result<Coordinates> {
    Coordinates::new(point.lat, point.lng)
}

/// What kind of text is being autosuggested
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputType {
    #[default]
    Text,
    VoconHybrid,
    NmdpAsr,
    GenericVoice,
    Speechmatics,
    MihupAsr,
    NuanceLumenvox,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::VoconHybrid => "vocon-hybrid",
            Self::NmdpAsr => "nmdp-asr",
            Self::GenericVoice => "generic-voice",
            Self::Speechmatics => "speechmatics",
            Self::MihupAsr => "mihup-asr",
            Self::NuanceLumenvox => "nuance-lumenvox",
        }
    }
}

/// Finalized, validated autosuggest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosuggestOptions {
    pub focus: Option<Coordinates>,
    pub n_results: u32,
    pub n_focus_results: Option<u32>,
    pub clip: Option<ClipFilter>,
    pub input_type: Option<InputType>,
    pub language: Option<String>,
    pub locale: Option<String>,
    pub prefer_land: Option<bool>,
}

impl Default for AutosuggestOptions {
    fn default() -> Self {
        Self {
            focus: None,
            n_results: DEFAULT_N_RESULTS,
            n_focus_results: None,
            clip: None,
            input_type: None,
            language: None,
            locale: None,
            prefer_land: None,
        }
    }
}

impl AutosuggestOptions {
    pub fn builder() -> AutosuggestOptionsBuilder {
        AutosuggestOptionsBuilder::default()
    }

    /// Re-open these options for editing
    pub fn to_builder(&self) -> AutosuggestOptionsBuilder {
        AutosuggestOptionsBuilder {
            options: self.clone(),
        }
    }

    /// Re-check invariants, e.g. after deserializing from a host
    pub fn validate(&self) -> Result<()> {
        if self.n_results == 0 {
            return Err(Error::Validation("n_results must be at least 1".to_string()));
        }
        if self.n_results > MAX_N_RESULTS {
            return Err(Error::Validation(format!(
                "n_results must be at most {MAX_N_RESULTS}, got {}",
                self.n_results
            )));
        }
        if let Some(n_focus) = self.n_focus_results
            && n_focus > self.n_results
        {
            return Err(Error::Validation(format!(
                "n_focus_results ({n_focus}) must not exceed n_results ({})",
                self.n_results
            )));
        }
        if let Some(focus) = self.focus {
            check(focus)?;
        }
        if let Some(clip) = &self.clip {
            clip.validate()?;
        }
        Ok(())
    }

    /// Query parameters in the order the service documents them.
    ///
    /// `n-focus-results` is only meaningful with a focus and is omitted otherwise.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("n-results", self.n_results.to_string())];

        if let Some(focus) = &self.focus {
            pairs.push(("focus", focus.to_api_string()));
            if let Some(n_focus) = self.n_focus_results {
                pairs.push(("n-focus-results", n_focus.to_string()));
            }
        }

        if let Some(clip) = &self.clip {
            pairs.push(clip.query_pair());
        }

        if let Some(input_type) = self.input_type {
            pairs.push(("input-type", input_type.as_str().to_string()));
        }

        if let Some(language) = &self.language {
            pairs.push(("language", language.clone()));
        }

        if let Some(locale) = &self.locale {
            pairs.push(("locale", locale.clone()));
        }

        if let Some(prefer_land) = self.prefer_land {
            pairs.push(("prefer-land", prefer_land.to_string()));
        }

        pairs
    }
}

/// Fluent builder for [`AutosuggestOptions`]
#[derive(Debug, Clone, Default)]
pub struct AutosuggestOptionsBuilder {
    options: AutosuggestOptions,
}

impl AutosuggestOptionsBuilder {
    /// Bias results toward this location
    pub fn focus(mut self, focus: Coordinates) -> Self {
        self.options.focus = Some(focus);
        self
    }

    /// Number of results; values above 100 are truncated to 100
    pub fn n_results(mut self, n: u32) -> Self {
        self.options.n_results = n.min(MAX_N_RESULTS);
        self
    }

    /// How many of the results are focused; must not exceed `n_results`
    pub fn n_focus_results(mut self, n: u32) -> Self {
        self.options.n_focus_results = Some(n);
        self
    }

    /// Replace any clip filter already configured
    pub fn clip(mut self, clip: ClipFilter) -> Self {
        self.options.clip = Some(clip);
        self
    }

    pub fn clip_to_circle(self, circle: Circle) -> Self {
        self.clip(ClipFilter::Circle(circle))
    }

    pub fn clip_to_bounding_box(self, bbox: BoundingBox) -> Self {
        self.clip(ClipFilter::BoundingBox(bbox))
    }

    pub fn clip_to_polygon(self, polygon: Polygon) -> Self {
        self.clip(ClipFilter::Polygon(polygon))
    }

    pub fn clip_to_country(self, codes: Countries) -> Self {
        self.clip(ClipFilter::Countries { codes })
    }

    pub fn clear_clip(mut self) -> Self {
        self.options.clip = None;
        self
    }

    pub fn input_type(mut self, input_type: InputType) -> Self {
        self.options.input_type = Some(input_type);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.options.language = Some(language.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.options.locale = Some(locale.into());
        self
    }

    pub fn prefer_land(mut self, prefer_land: bool) -> Self {
        self.options.prefer_land = Some(prefer_land);
        self
    }

    pub fn build(self) -> Result<AutosuggestOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: f64, lng: f64) -> Coordinates {
        Coordinates::new(lat, lng).unwrap()
    }

    #[test]
    fn test_defaults() {
        let options = AutosuggestOptions::builder().build().unwrap();
        assert_eq!(options.n_results, DEFAULT_N_RESULTS);
        assert_eq!(options.query_pairs(), vec![("n-results", "3".to_string())]);
    }

    #[test]
    fn test_n_focus_results_above_n_results_rejected() {
        let result = AutosuggestOptions::builder()
            .n_results(3)
            .n_focus_results(5)
            .build();
        assert!(matches!(result, Err(Error::Validation(_))));

        let ok = AutosuggestOptions::builder()
            .n_results(5)
            .n_focus_results(5)
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn test_n_results_truncated_and_zero_rejected() {
        let options = AutosuggestOptions::builder().n_results(500).build().unwrap();
        assert_eq!(options.n_results, MAX_N_RESULTS);

        assert!(AutosuggestOptions::builder().n_results(0).build().is_err());
    }

    #[test]
    fn test_last_clip_wins() {
        let circle = Circle::new(coords(51.5, -0.1), 5.0).unwrap();
        let countries = Countries::new(["gb", "BE"]).unwrap();

        let options = AutosuggestOptions::builder()
            .clip_to_circle(circle)
            .clip_to_country(countries.clone())
            .build()
            .unwrap();

        assert_eq!(options.clip, Some(ClipFilter::Countries { codes: countries }));
        let pairs = options.query_pairs();
        assert!(pairs.contains(&("clip-to-country", "GB,BE".to_string())));
        assert!(!pairs.iter().any(|(key, _)| *key == "clip-to-circle"));
    }

    #[test]
    fn test_focus_wraparound_in_query() {
        let options = AutosuggestOptions::builder()
            .focus(coords(51.5, 361.0))
            .n_focus_results(1)
            .build()
            .unwrap();
        let pairs = options.query_pairs();
        assert!(pairs.contains(&("focus", "51.5,1".to_string())));
        assert!(pairs.contains(&("n-focus-results", "1".to_string())));
    }

    #[test]
    fn test_n_focus_results_without_focus_omitted() {
        let options = AutosuggestOptions::builder()
            .n_focus_results(1)
            .build()
            .unwrap();
        assert!(!options.query_pairs().iter().any(|(key, _)| *key == "n-focus-results"));
    }

    #[test]
    fn test_validate_catches_deserialized_options() {
        let options: AutosuggestOptions =
            serde_json::from_str(r#"{"n_results": 2, "n_focus_results": 4}"#).unwrap();
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_deserialized_geometry_is_validated() {
        let bad_focus = r#"{"focus": {"lat": 999, "lng": 0}}"#;
        assert!(serde_json::from_str::<AutosuggestOptions>(bad_focus).is_err());

        let bad_circle = r#"{"clip": {"type": "circle", "center": {"lat": 0, "lng": 0}, "radius_km": -5}}"#;
        assert!(serde_json::from_str::<AutosuggestOptions>(bad_circle).is_err());

        let wrapped = r#"{"focus": {"lat": 51.5, "lng": 361}, "n_focus_results": 1}"#;
        let options: AutosuggestOptions = serde_json::from_str(wrapped).unwrap();
        options.validate().unwrap();
        assert!(options.query_pairs().contains(&("focus", "51.5,1".to_string())));
    }

    #[test]
    fn test_validate_rechecks_literal_geometry() {
        let options = AutosuggestOptions {
            focus: Some(Coordinates { lat: 91.0, lng: 0.0 }),
            ..AutosuggestOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::Validation(_))));

        let options = AutosuggestOptions {
            clip: Some(ClipFilter::Circle(Circle {
                center: coords(0.0, 0.0),
                radius_km: 0.0,
            })),
            ..AutosuggestOptions::default()
        };
        assert!(matches!(options.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_clip_filter_json_shape() {
        let json = r#"{"type":"countries","codes":["fr","de"]}"#;
        let clip: ClipFilter = serde_json::from_str(json).unwrap();
        assert_eq!(clip.query_pair(), ("clip-to-country", "FR,DE".to_string()));
    }
}
