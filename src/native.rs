//! Constructor-form codec for native queries.
//!
//! Raw query text may use shell constructor syntax - `ObjectId(...)`,
//! `ISODate(...)`, `Date()`, `NumberLong(...)`, `NumberInt(...)` - which is
//! not valid JSON. Rather than parse the shell grammar, each call is
//! textually rewritten into a marker array (`N(args)` becomes
//! `["___N", args]`) that survives a JSON parse, and the parsed tree is
//! then walked bottom-up replacing the markers with decoded values. The
//! marker arrays are an internal encoding and never surface to callers.

use std::sync::LazyLock;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use chrono::Utc;
use regex::Regex;
use serde_json::Value as Json;

use crate::error::{CompileError, CompileResult};
use crate::pipeline::builder::verify_stage;
use crate::pipeline::datetime::parse_timestamp;

/// Constructor names the codec understands.
const CONSTRUCTORS: [&str; 5] = ["ISODate", "ObjectId", "Date", "NumberLong", "NumberInt"];

/// Prefix distinguishing marker arrays from ordinary data.
const MARKER: &str = "___";

/// One pattern per constructor. `\b` keeps `Date(` from matching inside
/// `ISODate(`.
static CONSTRUCTOR_CALLS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    CONSTRUCTORS
        .iter()
        .map(|name| {
            let pattern = format!(r"\b{name}\(([^)]*)\)");
            (*name, Regex::new(&pattern).expect("static pattern"))
        })
        .collect()
});

/// Rewrite constructor calls into their JSON-safe marker form.
pub fn encode_constructors(text: &str) -> String {
    let mut out = text.to_string();
    for (name, pattern) in CONSTRUCTOR_CALLS.iter() {
        out = pattern
            .replace_all(&out, |caps: &regex::Captures<'_>| {
                let args = caps[1].trim();
                if args.is_empty() {
                    format!(r#"["{MARKER}{name}"]"#)
                } else {
                    format!(r#"["{MARKER}{name}", {args}]"#)
                }
            })
            .into_owned();
    }
    out
}

/// Parse native query text into pipeline stages.
///
/// Accepts either a JSON array of stages or a single stage object. Every
/// stage is checked against the stage schema before it is accepted.
pub fn parse_pipeline(text: &str) -> CompileResult<Vec<Document>> {
    let decoded = decode_str(text)?;
    let stages = match decoded {
        Bson::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                other => Err(CompileError::invalid("pipeline stage must be a document", &other)),
            })
            .collect::<CompileResult<Vec<_>>>()?,
        Bson::Document(doc) => vec![doc],
        other => {
            return Err(CompileError::invalid(
                "native query must be a pipeline array or a stage document",
                &other,
            ))
        }
    };
    for stage in &stages {
        verify_stage(stage)?;
    }
    Ok(stages)
}

/// Encode, JSON-parse, and decode a native query fragment.
pub fn decode_str(text: &str) -> CompileResult<Bson> {
    let encoded = encode_constructors(text);
    let parsed: Json = serde_json::from_str(&encoded)?;
    decode_value(parsed)
}

/// Bottom-up decode of the parsed tree, replacing marker arrays.
fn decode_value(value: Json) -> CompileResult<Bson> {
    let decoded = match value {
        Json::Null => Bson::Null,
        Json::Bool(b) => Bson::Boolean(b),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Bson::Int64(i)
            } else {
                Bson::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Json::String(s) => Bson::String(s),
        Json::Array(items) => {
            let items = items
                .into_iter()
                .map(decode_value)
                .collect::<CompileResult<Vec<_>>>()?;
            match constructor_name(&items) {
                Some(name) => decode_constructor(name, &items[1..])?,
                None => Bson::Array(items),
            }
        }
        Json::Object(map) => {
            let mut doc = Document::new();
            for (key, value) in map {
                doc.insert(key, decode_value(value)?);
            }
            Bson::Document(doc)
        }
    };
    Ok(decoded)
}

/// A marker array is `["___<Name>"]` or `["___<Name>", arg]` for a known
/// constructor name.
fn constructor_name(items: &[Bson]) -> Option<&'static str> {
    if items.is_empty() || items.len() > 2 {
        return None;
    }
    let Bson::String(head) = &items[0] else {
        return None;
    };
    let name = head.strip_prefix(MARKER)?;
    CONSTRUCTORS.iter().copied().find(|c| *c == name)
}

fn decode_constructor(name: &str, args: &[Bson]) -> CompileResult<Bson> {
    let invalid = |reason: &str| CompileError::InvalidConstructor {
        constructor: name.to_string(),
        reason: reason.to_string(),
    };
    let decoded = match name {
        "ISODate" => match args {
            [] => Bson::DateTime(bson::DateTime::now()),
            [Bson::String(s)] => {
                let at = parse_timestamp(s).ok_or_else(|| invalid("unparsable timestamp"))?;
                Bson::DateTime(bson::DateTime::from_chrono(at))
            }
            _ => return Err(invalid("expected a timestamp string")),
        },
        "ObjectId" => match args {
            [] => Bson::ObjectId(ObjectId::new()),
            [Bson::String(s)] => Bson::ObjectId(
                ObjectId::parse_str(s).map_err(|_| invalid("expected a 24-digit hex string"))?,
            ),
            _ => return Err(invalid("expected a hex string")),
        },
        // Zero-arg Date() is the shell's "now as a string".
        "Date" => match args {
            [] => Bson::String(Utc::now().format("%a %b %d %Y %H:%M:%S GMT%z").to_string()),
            _ => return Err(invalid("takes no arguments")),
        },
        "NumberLong" => Bson::Int64(integer_arg(args).ok_or_else(|| invalid("expected a 64-bit integer"))?),
        "NumberInt" => {
            let n = integer_arg(args).ok_or_else(|| invalid("expected a 32-bit integer"))?;
            Bson::Int32(
                i32::try_from(n).map_err(|_| invalid("expected a 32-bit integer"))?,
            )
        }
        _ => return Err(CompileError::UnknownClause(format!("constructor {name}"))),
    };
    Ok(decoded)
}

/// The numeric constructors accept a bare number or a quoted one.
fn integer_arg(args: &[Bson]) -> Option<i64> {
    match args {
        [Bson::Int64(n)] => Some(*n),
        [Bson::String(s)] => s.trim().parse().ok(),
        _ => None,
    }
}
