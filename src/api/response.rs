//! Response envelopes for endpoints that wrap their payload

use serde::Deserialize;

use crate::types::{Language, Line, Suggestion};

#[derive(Debug, Deserialize)]
pub(crate) struct AutosuggestResponse {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GridSectionResponse {
    #[serde(default)]
    pub lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AvailableLanguagesResponse {
    #[serde(default)]
    pub languages: Vec<Language>,
}
