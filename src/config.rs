//! Render configuration – the normalized parameters of one render call.
//!
//! A [`RenderConfig`] is built from a plain option map merged over explicit
//! defaults, then handed read-only to the engines. Changes go through the
//! `with_*` methods, which return a new value.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use crate::error::{PdfError, Result};

/// A plain key-value option map. Insertion order is preserved.
pub type Options = serde_json::Map<String, Value>;

/// Cache configuration name used when `cache` is `true`.
pub const DEFAULT_CACHE_NAME: &str = "pdf";

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::Landscape => "landscape",
        }
    }
}

impl FromStr for Orientation {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(PdfError::config(format!(
                "invalid orientation `{other}`, expected `portrait` or `landscape`"
            ))),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page margins in millimeters. `None` leaves the tool's default in place.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Margins {
    pub bottom: Option<f64>,
    pub left: Option<f64>,
    pub right: Option<f64>,
    pub top: Option<f64>,
}

impl Margins {
    /// The same margin on all four sides.
    pub fn uniform(margin: f64) -> Self {
        Self::from_sides(Some(margin), None, None, None)
    }

    /// Build margins from per-side values:
    /// - only `bottom` given: all four sides equal `bottom`
    /// - `top` missing: `top` mirrors `bottom`
    /// - `right` missing: `right` mirrors `left`
    pub fn from_sides(
        bottom: Option<f64>,
        left: Option<f64>,
        right: Option<f64>,
        top: Option<f64>,
    ) -> Self {
        let (mut left, mut right, mut top) = (left, right, top);
        if bottom.is_some() && left.is_none() && right.is_none() && top.is_none() {
            left = bottom;
            right = bottom;
            top = bottom;
        }
        if bottom.is_some() && top.is_none() {
            top = bottom;
        }
        if left.is_some() && right.is_none() {
            right = left;
        }
        Self {
            bottom,
            left,
            right,
            top,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sides().iter().all(|(_, v)| v.is_none())
    }

    /// Sides in command-line order: bottom, left, right, top.
    pub fn sides(&self) -> [(&'static str, Option<f64>); 4] {
        [
            ("bottom", self.bottom),
            ("left", self.left),
            ("right", self.right),
            ("top", self.top),
        ]
    }
}

/// Header or footer content.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Banner {
    pub left: Option<String>,
    pub center: Option<String>,
    pub right: Option<String>,
    /// A full HTML fragment, for tools that accept one.
    pub html: Option<String>,
}

impl Banner {
    pub fn new(left: Option<&str>, center: Option<&str>, right: Option<&str>) -> Self {
        Self {
            left: left.map(str::to_string),
            center: center.map(str::to_string),
            right: right.map(str::to_string),
            html: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_none() && self.center.is_none() && self.right.is_none() && self.html.is_none()
    }

    /// Text locations in command-line order: left, center, right.
    pub fn locations(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("left", self.left.as_deref()),
            ("center", self.center.as_deref()),
            ("right", self.right.as_deref()),
        ]
    }

    fn from_value(key: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::String(s) => Ok(Self::new(Some(s), None, None)),
            Value::Object(map) => {
                let field = |name: &str| -> Result<Option<String>> {
                    map.get(name)
                        .map(|v| scalar_string(&format!("{key}.{name}"), v))
                        .transpose()
                        .map(Option::flatten)
                };
                Ok(Self {
                    left: field("left")?,
                    center: field("center")?,
                    right: field("right")?,
                    html: field("html")?,
                })
            }
            _ => Err(PdfError::config(format!(
                "`{key}` must be a string or a {{left, center, right}} map"
            ))),
        }
    }
}

/// One permission tag from the closed set a protected PDF can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Print,
    DegradedPrint,
    Modify,
    Assembly,
    CopyContents,
    ScreenReaders,
    Annotate,
    FillIn,
}

impl Permission {
    pub const ALL: [Permission; 8] = [
        Permission::Print,
        Permission::DegradedPrint,
        Permission::Modify,
        Permission::Assembly,
        Permission::CopyContents,
        Permission::ScreenReaders,
        Permission::Annotate,
        Permission::FillIn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Print => "print",
            Permission::DegradedPrint => "degraded_print",
            Permission::Modify => "modify",
            Permission::Assembly => "assembly",
            Permission::CopyContents => "copy_contents",
            Permission::ScreenReaders => "screen_readers",
            Permission::Annotate => "annotate",
            Permission::FillIn => "fill_in",
        }
    }
}

impl FromStr for Permission {
    type Err = PdfError;

    fn from_str(s: &str) -> Result<Self> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PdfError::config(format!("invalid permission: {s}")))
    }
}

/// What a protected document still allows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permissions {
    #[default]
    None,
    All,
    Only(Vec<Permission>),
}

impl Permissions {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null | Value::Bool(false) => Ok(Permissions::None),
            Value::Bool(true) => Ok(Permissions::All),
            Value::String(s) if s == "all" => Ok(Permissions::All),
            Value::String(s) if s == "none" => Ok(Permissions::None),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.parse(),
                    other => Err(PdfError::config(format!("invalid permission: {other}"))),
                })
                .collect::<Result<Vec<_>>>()
                .map(Permissions::Only),
            other => Err(PdfError::config(format!(
                "`permissions` must be \"all\", \"none\" or a list of tags, got {other}"
            ))),
        }
    }
}

/// Normalized parameters of one render call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderConfig {
    page_size: String,
    orientation: Orientation,
    margins: Margins,
    title: Option<String>,
    encoding: String,
    header: Banner,
    footer: Banner,
    delay: Option<u64>,
    window_status: Option<String>,
    protect: bool,
    user_password: Option<String>,
    owner_password: Option<String>,
    permissions: Permissions,
    cache: Option<String>,
    filename: Option<String>,
    download: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            page_size: "A4".to_string(),
            orientation: Orientation::Portrait,
            margins: Margins::default(),
            title: None,
            encoding: "UTF-8".to_string(),
            header: Banner::default(),
            footer: Banner::default(),
            delay: None,
            window_status: None,
            protect: false,
            user_password: None,
            owner_password: None,
            permissions: Permissions::None,
            cache: None,
            filename: None,
            download: false,
        }
    }
}

impl RenderConfig {
    /// Build a configuration from an option map. Unknown keys are ignored;
    /// `engine` and `crypto` are resolved by the caller.
    pub fn from_options(options: &Options) -> Result<Self> {
        let mut config = Self::default();
        for (key, value) in options {
            config.apply(key, value)?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &Value) -> Result<()> {
        match key {
            "pageSize" => {
                if let Some(size) = scalar_string(key, value)? {
                    self.page_size = size;
                }
            }
            "orientation" => {
                if let Some(o) = scalar_string(key, value)? {
                    self.orientation = o.parse()?;
                }
            }
            "margin" => self.margins = margins_from_value(value)?,
            "title" => self.title = scalar_string(key, value)?,
            "encoding" => {
                if let Some(enc) = scalar_string(key, value)? {
                    self.encoding = enc;
                }
            }
            "header" => self.header = Banner::from_value(key, value)?,
            "footer" => self.footer = Banner::from_value(key, value)?,
            "delay" => self.delay = unsigned(key, value)?,
            "windowStatus" => self.window_status = scalar_string(key, value)?,
            "protect" => self.protect = boolean(key, value)?,
            "userPassword" => self.user_password = scalar_string(key, value)?,
            "ownerPassword" => self.owner_password = scalar_string(key, value)?,
            "permissions" => self.permissions = Permissions::from_value(value)?,
            "cache" => {
                self.cache = match value {
                    Value::Null | Value::Bool(false) => None,
                    Value::Bool(true) => Some(DEFAULT_CACHE_NAME.to_string()),
                    Value::String(name) => Some(name.clone()),
                    other => {
                        return Err(PdfError::config(format!(
                            "`cache` must be a boolean or a cache name, got {other}"
                        )))
                    }
                }
            }
            "filename" => self.filename = scalar_string(key, value)?,
            "download" => self.download = boolean(key, value)?,
            "engine" | "crypto" => {}
            other => log::debug!("ignoring unknown render option `{other}`"),
        }
        Ok(())
    }

    /// Check the protection invariants: at least one password, and two
    /// distinct passwords when both are set.
    pub fn check_passwords(&self) -> Result<()> {
        let user = self.user_password.as_deref().filter(|p| !p.is_empty());
        let owner = self.owner_password.as_deref().filter(|p| !p.is_empty());
        match (user, owner) {
            (None, None) => Err(PdfError::config(
                "protection requires at least an owner password or a user password",
            )),
            (Some(u), Some(o)) if u == o => Err(PdfError::config(
                "owner password and user password cannot be the same",
            )),
            _ => Ok(()),
        }
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.protect {
            self.check_passwords()?;
        }
        Ok(())
    }

    pub fn page_size(&self) -> &str {
        &self.page_size
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn header(&self) -> &Banner {
        &self.header
    }

    pub fn footer(&self) -> &Banner {
        &self.footer
    }

    /// JavaScript render delay in milliseconds.
    pub fn delay(&self) -> Option<u64> {
        self.delay
    }

    pub fn window_status(&self) -> Option<&str> {
        self.window_status.as_deref()
    }

    pub fn protect(&self) -> bool {
        self.protect
    }

    pub fn user_password(&self) -> Option<&str> {
        self.user_password.as_deref()
    }

    pub fn owner_password(&self) -> Option<&str> {
        self.owner_password.as_deref()
    }

    /// Granted permissions. Always `None` unless protection is on.
    pub fn permissions(&self) -> &Permissions {
        if self.protect {
            &self.permissions
        } else {
            &Permissions::None
        }
    }

    /// Name of the cache configuration, when caching is enabled.
    pub fn cache(&self) -> Option<&str> {
        self.cache.as_deref()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn download(&self) -> bool {
        self.download
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: impl Into<String>) -> Self {
        self.page_size = page_size.into();
        self
    }

    #[must_use]
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    #[must_use]
    pub fn with_margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = encoding.into();
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: Banner) -> Self {
        self.header = header;
        self
    }

    #[must_use]
    pub fn with_footer(mut self, footer: Banner) -> Self {
        self.footer = footer;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = Some(delay_ms);
        self
    }

    #[must_use]
    pub fn with_window_status(mut self, status: impl Into<String>) -> Self {
        self.window_status = Some(status.into());
        self
    }

    /// Turn on protection with the given passwords.
    #[must_use]
    pub fn with_protection(mut self, user: Option<&str>, owner: Option<&str>) -> Self {
        self.protect = true;
        self.user_password = user.map(str::to_string);
        self.owner_password = owner.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, name: Option<&str>) -> Self {
        self.cache = name.map(str::to_string);
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Merge `explicit` over `defaults`: explicit keys win, default-only keys
/// keep their position.
pub fn merge_options(defaults: &Options, explicit: &Options) -> Options {
    let mut merged = defaults.clone();
    for (key, value) in explicit {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Format a number without a trailing `.0` for whole values.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn scalar_string(key: &str, value: &Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        _ => Err(PdfError::config(format!("`{key}` must be a scalar value"))),
    }
}

fn boolean(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        _ => Err(PdfError::config(format!("`{key}` must be a boolean"))),
    }
}

fn unsigned(key: &str, value: &Value) -> Result<Option<u64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| PdfError::config(format!("`{key}` must be a non-negative integer"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PdfError::config(format!("`{key}` must be a non-negative integer"))),
        _ => Err(PdfError::config(format!("`{key}` must be an integer"))),
    }
}

fn millimeters(key: &str, value: &Value) -> Result<Option<f64>> {
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches("mm").trim().parse().ok(),
        _ => None,
    };
    match parsed {
        Some(mm) if mm.is_finite() && mm >= 0.0 => Ok(Some(mm)),
        _ => Err(PdfError::config(format!(
            "`{key}` must be a non-negative number of millimeters"
        ))),
    }
}

fn margins_from_value(value: &Value) -> Result<Margins> {
    match value {
        Value::Object(map) => {
            let side = |name: &str| match map.get(name) {
                Some(v) => millimeters(&format!("margin.{name}"), v),
                None => Ok(None),
            };
            Ok(Margins::from_sides(
                side("bottom")?,
                side("left")?,
                side("right")?,
                side("top")?,
            ))
        }
        other => Ok(millimeters("margin", other)?
            .map(Margins::uniform)
            .unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: Value) -> Options {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn single_margin_applies_to_all_sides() {
        for bottom in [0.0, 7.5, 15.0, 200.0] {
            let m = Margins::uniform(bottom);
            assert_eq!(m.bottom, Some(bottom));
            assert_eq!(m.left, Some(bottom));
            assert_eq!(m.right, Some(bottom));
            assert_eq!(m.top, Some(bottom));
        }
    }

    #[test]
    fn two_margins_mirror_top_and_right() {
        let m = Margins::from_sides(Some(15.0), Some(20.0), None, None);
        assert_eq!(m.top, Some(15.0));
        assert_eq!(m.right, Some(20.0));
        assert_eq!(m.bottom, Some(15.0));
        assert_eq!(m.left, Some(20.0));
    }

    #[test]
    fn four_explicit_margins_are_kept() {
        let m = Margins::from_sides(Some(15.0), Some(20.0), Some(25.0), Some(30.0));
        assert_eq!(
            m,
            Margins {
                bottom: Some(15.0),
                left: Some(20.0),
                right: Some(25.0),
                top: Some(30.0),
            }
        );

        // Field order in the map does not matter.
        let config = RenderConfig::from_options(&options(json!({
            "margin": {"top": 30, "right": 25, "left": 20, "bottom": 15}
        })))
        .unwrap();
        assert_eq!(config.margins(), m);
    }

    #[test]
    fn scalar_margin_option() {
        let config = RenderConfig::from_options(&options(json!({"margin": "12mm"}))).unwrap();
        assert_eq!(config.margins(), Margins::uniform(12.0));
        assert!(RenderConfig::from_options(&options(json!({"margin": "wide"}))).is_err());
    }

    #[test]
    fn options_round_trip_through_accessors() {
        let config = RenderConfig::from_options(&options(json!({
            "pageSize": "Letter",
            "orientation": "landscape",
            "title": "Quarterly",
            "encoding": "ISO-8859-1",
            "delay": 250,
            "windowStatus": "ready",
            "protect": true,
            "userPassword": "user",
            "ownerPassword": "owner",
            "permissions": ["print", "copy_contents"],
            "cache": true,
            "header": {"left": "L", "center": "C", "right": "R"},
            "footer": "page [page]",
            "filename": "report.pdf",
            "download": true
        })))
        .unwrap();

        assert_eq!(config.page_size(), "Letter");
        assert_eq!(config.orientation(), Orientation::Landscape);
        assert_eq!(config.title(), Some("Quarterly"));
        assert_eq!(config.encoding(), "ISO-8859-1");
        assert_eq!(config.delay(), Some(250));
        assert_eq!(config.window_status(), Some("ready"));
        assert!(config.protect());
        assert_eq!(config.user_password(), Some("user"));
        assert_eq!(config.owner_password(), Some("owner"));
        assert_eq!(
            config.permissions(),
            &Permissions::Only(vec![Permission::Print, Permission::CopyContents])
        );
        assert_eq!(config.cache(), Some(DEFAULT_CACHE_NAME));
        assert_eq!(config.header(), &Banner::new(Some("L"), Some("C"), Some("R")));
        assert_eq!(config.footer().left.as_deref(), Some("page [page]"));
        assert_eq!(config.filename(), Some("report.pdf"));
        assert!(config.download());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_orientation_is_a_configuration_error() {
        let err = RenderConfig::from_options(&options(json!({"orientation": "diagonal"})))
            .unwrap_err();
        assert!(matches!(err, PdfError::Configuration(_)));
    }

    #[test]
    fn unknown_permission_tag_is_rejected() {
        let err = RenderConfig::from_options(&options(json!({"permissions": ["print", "fly"]})))
            .unwrap_err();
        assert_eq!(err.to_string(), "configuration error: invalid permission: fly");
    }

    #[test]
    fn permissions_ignored_without_protection() {
        let config = RenderConfig::from_options(&options(json!({"permissions": "all"}))).unwrap();
        assert_eq!(config.permissions(), &Permissions::None);
        let config = config.with_protection(None, Some("owner"));
        assert_eq!(config.permissions(), &Permissions::All);
    }

    #[test]
    fn password_rules() {
        let base = RenderConfig::default();
        assert!(base.validate().is_ok());

        let neither = base.clone().with_protection(None, None);
        assert!(matches!(neither.validate(), Err(PdfError::Configuration(_))));

        let same = base.clone().with_protection(Some("secret"), Some("secret"));
        assert!(matches!(same.validate(), Err(PdfError::Configuration(_))));

        let owner_only = base.with_protection(None, Some("secret"));
        assert!(owner_only.validate().is_ok());
    }

    #[test]
    fn explicit_options_override_defaults() {
        let defaults = options(json!({"pageSize": "A4", "orientation": "portrait", "title": "D"}));
        let explicit = options(json!({"orientation": "landscape", "delay": 10}));
        let merged = merge_options(&defaults, &explicit);
        let keys: Vec<&str> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, ["pageSize", "orientation", "title", "delay"]);
        assert_eq!(merged["orientation"], json!("landscape"));
    }

    #[test]
    fn numbers_format_without_trailing_zero() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(15.0), "15");
        assert_eq!(format_number(12.5), "12.5");
    }
}
