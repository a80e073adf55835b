//! Persisted FRET parameters.
//!
//! Settings are stored as Java-properties style `key=value` lines. Keys contain
//! spaces, which are escaped with a backslash on output. Missing keys fall back to
//! their defaults so older or partial files still load.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::background::FretBackgrounds;
use crate::calibration::BleedThroughFit;
use crate::error::{Error, Result};
use crate::fret::{FretConfig, FretParameters, Normalization};
use crate::model::{FittedModel, ModelKind};

const HEADER: &str = "#PixFRET parameters";

const KEY_FACTOR: &str = "fact";
const KEY_BLUR: &str = "blur";
const KEY_NORMALIZATION: &str = "Normalization";
const KEY_DISPLAY_BLURRED: &str = "Display Blurred Images";

/// Which channel a set of bleed-through models belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Donor,
    Acceptor,
}

impl Channel {
    fn label(self) -> &'static str {
        match self {
            Channel::Donor => "Donor",
            Channel::Acceptor => "Accep",
        }
    }

    fn param_key(self, kind: ModelKind, param: char) -> String {
        format!("{kind} {} {param}", self.label())
    }

    fn model_key(self) -> String {
        format!("Model {}", self.label())
    }
}

/// The three bleed-through models of one channel and the one selected for FRET.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelModels {
    pub selected: ModelKind,
    pub constant: FittedModel,
    pub linear: FittedModel,
    pub exponential: FittedModel,
}

impl ChannelModels {
    fn with_defaults(selected: ModelKind, constant_a: f32) -> Self {
        Self {
            selected,
            constant: FittedModel::constant(constant_a),
            linear: FittedModel::linear(0.0, 0.0),
            exponential: FittedModel::exponential(0.0, 0.0, 0.0),
        }
    }

    pub fn model(&self, kind: ModelKind) -> FittedModel {
        match kind {
            ModelKind::Constant => self.constant,
            ModelKind::Linear => self.linear,
            ModelKind::Exponential => self.exponential,
        }
    }

    fn model_mut(&mut self, kind: ModelKind) -> &mut FittedModel {
        match kind {
            ModelKind::Constant => &mut self.constant,
            ModelKind::Linear => &mut self.linear,
            ModelKind::Exponential => &mut self.exponential,
        }
    }

    /// The model used for FRET correction.
    pub fn selected_model(&self) -> FittedModel {
        self.model(self.selected)
    }

    /// Replaces every model the calibration managed to fit; the others keep their
    /// previous parameters.
    pub fn apply_fit(&mut self, fit: &BleedThroughFit) {
        for kind in [ModelKind::Constant, ModelKind::Linear, ModelKind::Exponential] {
            let model = fit.model(kind);
            if model.fitted {
                *self.model_mut(kind) = model;
            }
        }
    }
}

/// All persisted parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub donor: ChannelModels,
    pub acceptor: ChannelModels,
    pub correction_factor: f32,
    pub blur_sigma: f32,
    pub normalization: Normalization,
    pub display_blurred: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            donor: ChannelModels::with_defaults(ModelKind::Exponential, 0.33818),
            acceptor: ChannelModels::with_defaults(ModelKind::Constant, 0.01534),
            correction_factor: 1.0,
            blur_sigma: 3.0,
            normalization: Normalization::Donor,
            display_blurred: true,
        }
    }
}

impl Settings {
    /// FRET configuration derived from these settings.
    pub fn fret_config(&self) -> FretConfig {
        FretConfig {
            blur_sigma: self.blur_sigma,
            correction_factor: self.correction_factor,
            normalization: self.normalization,
            keep_smoothed: self.display_blurred,
        }
    }

    /// Everything the FRET computation needs once backgrounds are known.
    pub fn fret_parameters(&self, backgrounds: FretBackgrounds) -> FretParameters {
        FretParameters {
            config: self.fret_config(),
            backgrounds,
            donor_model: self.donor.selected_model(),
            acceptor_model: self.acceptor.selected_model(),
        }
    }

    /// Key/value pairs in the persisted format.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for (channel, models) in [
            (Channel::Donor, &self.donor),
            (Channel::Acceptor, &self.acceptor),
        ] {
            let [a, _, _] = models.constant.params;
            map.insert(channel.param_key(ModelKind::Constant, 'a'), a.to_string());

            let [a, b, _] = models.linear.params;
            map.insert(channel.param_key(ModelKind::Linear, 'a'), a.to_string());
            map.insert(channel.param_key(ModelKind::Linear, 'b'), b.to_string());

            let [a, b, e] = models.exponential.params;
            map.insert(channel.param_key(ModelKind::Exponential, 'a'), a.to_string());
            map.insert(channel.param_key(ModelKind::Exponential, 'b'), b.to_string());
            map.insert(channel.param_key(ModelKind::Exponential, 'e'), e.to_string());

            map.insert(channel.model_key(), models.selected.index().to_string());
        }
        map.insert(KEY_FACTOR.to_string(), self.correction_factor.to_string());
        map.insert(KEY_BLUR.to_string(), self.blur_sigma.to_string());
        map.insert(KEY_NORMALIZATION.to_string(), self.normalization.to_string());
        map.insert(
            KEY_DISPLAY_BLURRED.to_string(),
            self.display_blurred.to_string(),
        );
        map
    }

    /// Builds settings from key/value pairs; absent keys keep their defaults.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();

        for (channel, models) in [
            (Channel::Donor, &mut settings.donor),
            (Channel::Acceptor, &mut settings.acceptor),
        ] {
            let params: [(ModelKind, &[char]); 3] = [
                (ModelKind::Constant, &['a']),
                (ModelKind::Linear, &['a', 'b']),
                (ModelKind::Exponential, &['a', 'b', 'e']),
            ];
            for (kind, names) in params {
                let model = models.model_mut(kind);
                for (slot, &name) in names.iter().enumerate() {
                    if let Some(v) = parse_entry::<f32>(map, &channel.param_key(kind, name))? {
                        model.params[slot] = v;
                    }
                }
            }

            let key = channel.model_key();
            if let Some(index) = parse_entry::<usize>(map, &key)? {
                models.selected = ModelKind::from_index(index).ok_or_else(|| Error::InvalidSetting {
                    key: key.clone(),
                    value: index.to_string(),
                })?;
            }
        }

        if let Some(v) = parse_checked(map, KEY_FACTOR, |v| v.is_finite() && v >= 0.0)? {
            settings.correction_factor = v;
        }
        if let Some(v) = parse_checked(map, KEY_BLUR, f32::is_finite)? {
            settings.blur_sigma = v;
        }
        if let Some(label) = map.get(KEY_NORMALIZATION) {
            match Normalization::from_str(label) {
                Ok(n) => settings.normalization = n,
                Err(_) => warn!(label = %label, "Unknown normalization, keeping the default"),
            }
        }
        if let Some(value) = map.get(KEY_DISPLAY_BLURRED) {
            settings.display_blurred = parse_bool(KEY_DISPLAY_BLURRED, value)?;
        }

        Ok(settings)
    }

    /// Properties text with a header comment and one `key=value` line per entry.
    pub fn to_properties(&self) -> String {
        let mut out = String::new();
        out.push_str(HEADER);
        out.push('\n');
        for (key, value) in self.to_map() {
            out.push_str(&format!("{}={}\n", escape(&key, true), escape(&value, false)));
        }
        out
    }

    pub fn from_properties(text: &str) -> Result<Self> {
        Self::from_map(&parse_properties(text))
    }
}

fn parse_entry<T: FromStr>(map: &BTreeMap<String, String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = map.get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::InvalidSetting {
            key: key.to_string(),
            value: raw.clone(),
        })
}

/// Like [`parse_entry`], but values failing `valid` are rejected as well.
fn parse_checked(
    map: &BTreeMap<String, String>,
    key: &str,
    valid: impl Fn(f32) -> bool,
) -> Result<Option<f32>> {
    match parse_entry::<f32>(map, key)? {
        Some(v) if !valid(v) => Err(Error::InvalidSetting {
            key: key.to_string(),
            value: map.get(key).cloned().unwrap_or_default(),
        }),
        parsed => Ok(parsed),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim() {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(Error::InvalidSetting {
            key: key.to_string(),
            value: raw.to_string(),
        }),
    }
}

/// Backslash-escapes separators and backslashes. In keys every space is escaped,
/// in values only leading spaces.
fn escape(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    let mut leading = true;
    for ch in s.chars() {
        match ch {
            ' ' if is_key || leading => out.push_str("\\ "),
            '\\' | '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
        if ch != ' ' {
            leading = false;
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('t') => out.push('\t'),
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Parses `key=value` / `key:value` lines. Blank lines and lines starting with
/// `#` or `!` are skipped.
pub fn parse_properties(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut escaped = false;
        let mut split = None;
        for (i, ch) in line.char_indices() {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '=' || ch == ':' {
                split = Some(i);
                break;
            }
        }

        let (key, value) = match split {
            Some(i) => (&line[..i], &line[i + 1..]),
            None => (line, ""),
        };
        map.insert(
            unescape(key.trim_end()),
            unescape(value.trim_start()).trim_end().to_string(),
        );
    }
    map
}
