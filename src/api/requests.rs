//! Request builders, one per endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::response::{AutosuggestResponse, AvailableLanguagesResponse, GridSectionResponse};
use super::{ApiRequest, What3WordsV3};
use crate::error::{Error, Result};
use crate::options::{AutosuggestOptions, AutosuggestOptionsBuilder, ClipFilter, InputType};
use crate::types::{
    BoundingBox, Circle, Coordinates, Countries, Language, Line, Location, Polygon, Suggestion,
};

/// coordinates -> three word address
pub struct ConvertTo3waRequest {
    client: What3WordsV3,
    coordinates: Coordinates,
    language: Option<String>,
    locale: Option<String>,
}

impl ConvertTo3waRequest {
    pub(crate) fn new(client: What3WordsV3, coordinates: Coordinates) -> Self {
        Self {
            client,
            coordinates,
            language: None,
            locale: None,
        }
    }

    /// Language of the returned address (ISO 639-1)
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }
}

#[async_trait]
impl ApiRequest for ConvertTo3waRequest {
    type Output = Location;

    async fn send(self) -> Result<Location> {
        let mut query = vec![("coordinates", self.coordinates.to_api_string())];
        if let Some(language) = self.language {
            query.push(("language", language));
        }
        if let Some(locale) = self.locale {
            query.push(("locale", locale));
        }
        self.client.get("convert-to-3wa", query).await
    }
}

/// three word address -> coordinates
pub struct ConvertToCoordinatesRequest {
    client: What3WordsV3,
    words: String,
}

impl ConvertToCoordinatesRequest {
    pub(crate) fn new(client: What3WordsV3, words: String) -> Self {
        Self { client, words }
    }
}

#[async_trait]
impl ApiRequest for ConvertToCoordinatesRequest {
    type Output = Location;

    async fn send(self) -> Result<Location> {
        let words = self.words.trim().trim_start_matches('/');
        if words.is_empty() {
            return Err(Error::Validation("words must not be empty".to_string()));
        }
        self.client
            .get("convert-to-coordinates", vec![("words", words.to_string())])
            .await
    }
}

/// Ranked suggestions for a partial address
pub struct AutosuggestRequest {
    client: What3WordsV3,
    input: String,
    with_coordinates: bool,
    options: AutosuggestOptionsBuilder,
}

impl AutosuggestRequest {
    pub(crate) fn new(client: What3WordsV3, input: String, with_coordinates: bool) -> Self {
        Self {
            client,
            input,
            with_coordinates,
            options: AutosuggestOptions::builder(),
        }
    }

    /// Replace every filter with a prepared set of options
    pub fn options(mut self, options: &AutosuggestOptions) -> Self {
        self.options = options.to_builder();
        self
    }

    pub fn focus(mut self, focus: Coordinates) -> Self {
        self.options = self.options.focus(focus);
        self
    }

    pub fn n_results(mut self, n: u32) -> Self {
        self.options = self.options.n_results(n);
        self
    }

    pub fn n_focus_results(mut self, n: u32) -> Self {
        self.options = self.options.n_focus_results(n);
        self
    }

    pub fn clip(mut self, clip: ClipFilter) -> Self {
        self.options = self.options.clip(clip);
        self
    }

    pub fn clip_to_circle(mut self, circle: Circle) -> Self {
        self.options = self.options.clip_to_circle(circle);
        self
    }

    pub fn clip_to_bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.options = self.options.clip_to_bounding_box(bbox);
        self
    }

    pub fn clip_to_polygon(mut self, polygon: Polygon) -> Self {
        self.options = self.options.clip_to_polygon(polygon);
        self
    }

    pub fn clip_to_country(mut self, codes: Countries) -> Self {
        self.options = self.options.clip_to_country(codes);
        self
    }

    pub fn input_type(mut self, input_type: InputType) -> Self {
        self.options = self.options.input_type(input_type);
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.options = self.options.language(language);
        self
    }

    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.options = self.options.locale(locale);
        self
    }

    pub fn prefer_land(mut self, prefer_land: bool) -> Self {
        self.options = self.options.prefer_land(prefer_land);
        self
    }

    fn path(&self) -> &'static str {
        if self.with_coordinates {
            "autosuggest-with-coordinates"
        } else {
            "autosuggest"
        }
    }
}

#[async_trait]
impl ApiRequest for AutosuggestRequest {
    type Output = Vec<Suggestion>;

    async fn send(self) -> Result<Vec<Suggestion>> {
        let path = self.path();
        let options = self.options.build()?;

        let mut query = vec![("input", self.input)];
        query.extend(options.query_pairs());

        let response: AutosuggestResponse = self.client.get(path, query).await?;
        debug!("autosuggest returned {} suggestions", response.suggestions.len());
        Ok(response.suggestions)
    }
}

/// Where a selected suggestion came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceApi {
    #[default]
    Text,
    Voice,
}

impl SourceApi {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
        }
    }
}

/// Records the suggestion a user picked, with the filters that produced it
pub struct AutosuggestSelectionRequest {
    client: What3WordsV3,
    raw_input: String,
    selection: String,
    rank: u32,
    source: SourceApi,
    options: Option<AutosuggestOptions>,
}

impl AutosuggestSelectionRequest {
    pub(crate) fn new(
        client: What3WordsV3,
        raw_input: String,
        selection: String,
        rank: u32,
        source: SourceApi,
    ) -> Self {
        Self {
            client,
            raw_input,
            selection,
            rank,
            source,
            options: None,
        }
    }

    pub fn options(mut self, options: &AutosuggestOptions) -> Self {
        self.options = Some(options.clone());
        self
    }
}

#[async_trait]
impl ApiRequest for AutosuggestSelectionRequest {
    type Output = ();

    async fn send(self) -> Result<()> {
        if self.selection.trim().is_empty() {
            return Err(Error::Validation("selection must not be empty".to_string()));
        }

        let mut query = vec![
            ("raw-input", self.raw_input),
            ("selection", self.selection),
            ("rank", self.rank.to_string()),
            ("source-api", self.source.as_str().to_string()),
        ];
        if let Some(options) = self.options {
            options.validate()?;
            query.extend(options.query_pairs());
        }

        self.client.get_empty("autosuggest-selection", query).await
    }
}

/// Grid lines inside a bounding box
pub struct GridSectionRequest {
    client: What3WordsV3,
    bounding_box: BoundingBox,
}

impl GridSectionRequest {
    pub(crate) fn new(client: What3WordsV3, bounding_box: BoundingBox) -> Self {
        Self {
            client,
            bounding_box,
        }
    }
}

#[async_trait]
impl ApiRequest for GridSectionRequest {
    type Output = Vec<Line>;

    async fn send(self) -> Result<Vec<Line>> {
        let query = vec![("bounding-box", self.bounding_box.to_api_string())];
        let response: GridSectionResponse = self.client.get("grid-section", query).await?;
        Ok(response.lines)
    }
}

pub struct AvailableLanguagesRequest {
    client: What3WordsV3,
}

impl AvailableLanguagesRequest {
    pub(crate) fn new(client: What3WordsV3) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiRequest for AvailableLanguagesRequest {
    type Output = Vec<Language>;

    async fn send(self) -> Result<Vec<Language>> {
        let response: AvailableLanguagesResponse =
            self.client.get("available-languages", Vec::new()).await?;
        Ok(response.languages)
    }
}
