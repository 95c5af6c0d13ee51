//! Shared types used across the tool execution engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Execution scene
// ---------------------------------------------------------------------------

/// The calling context of a tool execution. Decides which tool and plugin
/// revision is used and whether agent-level overrides apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecScene {
    /// A published agent answering an end user.
    OnlineAgent,
    /// An agent being edited in the IDE.
    DraftAgent,
    /// A developer debugging a single tool.
    ToolDebug,
    /// A workflow node invoking the tool.
    Workflow,
}

impl fmt::Display for ExecScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnlineAgent => write!(f, "online_agent"),
            Self::DraftAgent => write!(f, "draft_agent"),
            Self::ToolDebug => write!(f, "tool_debug"),
            Self::Workflow => write!(f, "workflow"),
        }
    }
}

impl FromStr for ExecScene {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "online_agent" => Ok(Self::OnlineAgent),
            "draft_agent" => Ok(Self::DraftAgent),
            "tool_debug" => Ok(Self::ToolDebug),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!("invalid execute scene '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Response handling
// ---------------------------------------------------------------------------

/// What to do when a response field does not match its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidRespStrategy {
    /// Only strip unknown and disabled fields; values pass through untouched.
    #[default]
    ReturnRaw,
    /// Replace mismatched values with the zero value of the declared type.
    ReturnDefault,
    /// Fail on the first mismatched value.
    ReturnErr,
}

impl FromStr for InvalidRespStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" | "return_raw" => Ok(Self::ReturnRaw),
            "default" | "return_default" => Ok(Self::ReturnDefault),
            "error" | "err" | "return_err" => Ok(Self::ReturnErr),
            other => Err(format!("invalid response process strategy '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Where a tool parameter travels in the outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Query => write!(f, "query"),
            Self::Header => write!(f, "header"),
            Self::Cookie => write!(f, "cookie"),
            Self::Body => write!(f, "body"),
        }
    }
}

/// OpenAPI parameter serialization styles the encoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamStyle {
    Simple,
    Label,
    Matrix,
    Form,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl fmt::Display for ParamStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "simple"),
            Self::Label => write!(f, "label"),
            Self::Matrix => write!(f, "matrix"),
            Self::Form => write!(f, "form"),
            Self::SpaceDelimited => write!(f, "spaceDelimited"),
            Self::PipeDelimited => write!(f, "pipeDelimited"),
            Self::DeepObject => write!(f, "deepObject"),
        }
    }
}

/// JSON-schema type of a parameter or response field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Anything else a manifest may carry (`null`, typos, ...).
    #[serde(other)]
    Unsupported,
}

impl SchemaType {
    pub fn is_scalar(self) -> bool {
        matches!(
            self,
            Self::String | Self::Integer | Self::Number | Self::Boolean
        )
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Integer => write!(f, "integer"),
            Self::Number => write!(f, "number"),
            Self::Boolean => write!(f, "boolean"),
            Self::Array => write!(f, "array"),
            Self::Object => write!(f, "object"),
            Self::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// Marker on string parameters that carry a reference to an uploaded resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistType {
    File,
    Image,
    Doc,
    Ppt,
    Code,
    Excel,
    Audio,
    Zip,
    Video,
    Txt,
    /// Unknown markers are carried but never trigger URI conversion.
    #[serde(other)]
    Unknown,
}

impl AssistType {
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

// ---------------------------------------------------------------------------
// Body media types
// ---------------------------------------------------------------------------

/// Request body media types, in the order the builder prefers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    ProblemJson,
    FormUrlEncoded,
    XYaml,
    Yaml,
}

impl MediaType {
    /// Fixed selection priority when a tool declares several body encodings.
    pub const PRIORITY: [MediaType; 5] = [
        MediaType::Json,
        MediaType::ProblemJson,
        MediaType::FormUrlEncoded,
        MediaType::XYaml,
        MediaType::Yaml,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::ProblemJson => "application/problem+json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::XYaml => "application/x-yaml",
            Self::Yaml => "application/yaml",
        }
    }

    pub fn is_json(self) -> bool {
        matches!(self, Self::Json | Self::ProblemJson)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PRIORITY
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported content type '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Per-operation OAuth requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAuthMode {
    /// A missing token interrupts the call with an authorization prompt.
    #[default]
    Required,
    /// A token is attached when present; the call proceeds without one.
    Supported,
    /// No OAuth token is ever attached.
    Disabled,
}

/// Language for user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        if lower.starts_with("zh") {
            Ok(Self::Zh)
        } else if lower.starts_with("en") {
            Ok(Self::En)
        } else {
            Err(format!("unsupported locale '{s}'"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_parses_case_insensitively() {
        assert_eq!(
            "Application/JSON".parse::<MediaType>().unwrap(),
            MediaType::Json
        );
        assert!("text/plain".parse::<MediaType>().is_err());
    }

    #[test]
    fn unknown_schema_type_deserializes_as_unsupported() {
        let t: SchemaType = serde_json::from_str("\"null\"").unwrap();
        assert_eq!(t, SchemaType::Unsupported);
        let a: AssistType = serde_json::from_str("\"hologram\"").unwrap();
        assert!(!a.is_valid());
    }

    #[test]
    fn scene_accepts_kebab_case() {
        assert_eq!(
            "tool-debug".parse::<ExecScene>().unwrap(),
            ExecScene::ToolDebug
        );
    }
}
