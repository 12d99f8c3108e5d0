//! Response shape of the Gemini `models/{model}:generateContent` REST call.

use crate::codec::TransportBlob;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub grounding_metadata: Option<GroundingMetadata>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<TransportBlob>,
    #[serde(default)]
    pub thought: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GroundingChunk {
    pub web: Option<WebChunk>,
    pub maps: Option<MapsChunk>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WebChunk {
    pub title: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct MapsChunk {
    pub title: Option<String>,
    pub uri: Option<String>,
    pub google_maps_uri: Option<String>,
}

impl GenerateContentResponse {
    fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    /// Concatenated answer text of the first candidate, thoughts excluded.
    pub fn text(&self) -> String {
        self.first_candidate()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// `candidates[0].content.parts[0].inlineData`
    pub fn first_inline_data(&self) -> Option<&TransportBlob> {
        self.first_candidate()?
            .content
            .as_ref()?
            .parts
            .first()?
            .inline_data
            .as_ref()
    }

    pub fn grounding_chunks(&self) -> &[GroundingChunk] {
        self.first_candidate()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or(&[])
    }
}
