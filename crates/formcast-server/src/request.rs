// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Request body for `POST /api/pdf/send` and its validation.
//
// Field names accepted by earlier clients (`cloudinaryUrl`, `cloudinaryUrls`,
// `email`) are kept as aliases.

use std::collections::{BTreeMap, HashSet};

use formcast_core::SubstitutionMap;
use formcast_core::error::FormcastError;
use formcast_delivery::validate_recipient;
use formcast_document::{TitleBlock, TitleBlockCell};
use serde::Deserialize;
use tracing::warn;

/// Raw request body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default, alias = "cloudinaryUrls")]
    pub urls: Vec<String>,
    #[serde(default, alias = "cloudinaryUrl")]
    pub url: Option<String>,
    #[serde(default, alias = "email")]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub auto_card_url: Option<String>,
    /// Named form fields, e.g. `clientName`.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Marker character to value. Wins over `fields`.
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
    #[serde(default)]
    pub title_block: Option<Vec<TitleBlockCell>>,
}

/// A request that passed validation.
#[derive(Debug, Clone)]
pub struct SendJob {
    pub urls: Vec<String>,
    pub recipient: String,
    pub secondary_link: Option<String>,
    pub substitutions: SubstitutionMap,
    pub title_block: Option<TitleBlock>,
}

impl SendRequest {
    /// Check required fields and resolve named fields to marker characters.
    /// `today` fills the `date` field when the caller leaves it out.
    pub fn validate(
        self,
        field_markers: &BTreeMap<String, char>,
        today: &str,
    ) -> Result<SendJob, FormcastError> {
        // Repeats are dropped wherever they appear; first occurrence wins.
        let mut seen = HashSet::new();
        let urls: Vec<String> = self
            .urls
            .into_iter()
            .chain(self.url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();
        if urls.is_empty() {
            return Err(FormcastError::InvalidRequest(
                "at least one document URL is required".into(),
            ));
        }

        let recipient = self
            .recipient_email
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or_else(|| FormcastError::InvalidRequest("recipientEmail is required".into()))?;
        validate_recipient(&recipient)?;

        let mut substitutions = SubstitutionMap::new();
        for (name, value) in &self.fields {
            match field_markers.get(name) {
                Some(marker) => {
                    substitutions.insert(*marker, value.clone());
                }
                None => warn!(field = %name, "Ignoring unknown field"),
            }
        }
        if !self.fields.contains_key("date") {
            if let Some(marker) = field_markers.get("date") {
                substitutions.insert(*marker, today);
            }
        }
        for (key, value) in self.substitutions {
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(marker), None) if !marker.is_whitespace() => {
                    substitutions.insert(marker, value);
                }
                _ => {
                    return Err(FormcastError::InvalidRequest(format!(
                        "substitution key '{key}' must be a single marker character"
                    )));
                }
            }
        }

        Ok(SendJob {
            urls,
            recipient,
            secondary_link: self.auto_card_url.filter(|l| !l.trim().is_empty()),
            substitutions,
            title_block: self
                .title_block
                .filter(|cells| !cells.is_empty())
                .map(TitleBlock::new),
        })
    }
}
