//! `codesign`-backed verification and entitlement extraction
//!
//! Verification runs `codesign --verify --strict` for validity and
//! `codesign -dvvv` for the authority chain. Entitlements come from
//! `codesign -d --entitlements - --xml` and are parsed with the `plist` crate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{EntitlementReader, SigningError, TrustVerifier, Verification};
use crate::models::SigningStatus;

const CODESIGN: &str = "/usr/bin/codesign";

/// Leaf authority of binaries signed by Apple itself
const APPLE_LEAF: &str = "Software Signing";

/// Root of every Apple-issued signing chain
const APPLE_ROOT: &str = "Apple Root CA";

fn run(program: &Path, args: &[&str], path: &Path) -> Result<Output, SigningError> {
    Command::new(program)
        .args(args)
        .arg(path)
        .output()
        .map_err(SigningError::Spawn)
}

/// Status of a failed `codesign --verify`
fn failure_status(stderr: &str) -> SigningStatus {
    if stderr.contains("not signed at all") {
        SigningStatus::Unsigned
    } else if stderr.contains("CSSMERR_TP_CERT_REVOKED") || stderr.contains("revoked") {
        SigningStatus::Revoked
    } else {
        SigningStatus::Invalid
    }
}

/// Authorities (leaf first) and ad-hoc flag from `codesign -dvvv` output
fn parse_details(details: &str) -> (Vec<String>, bool) {
    static AUTHORITY: OnceLock<Option<Regex>> = OnceLock::new();
    let authorities = AUTHORITY
        .get_or_init(|| Regex::new(r"(?m)^Authority=(.+)$").ok())
        .as_ref()
        .map(|re| {
            re.captures_iter(details)
                .map(|caps| caps[1].trim().to_string())
                .collect()
        })
        .unwrap_or_default();
    let adhoc = details.lines().any(|line| line.trim() == "Signature=adhoc");
    (authorities, adhoc)
}

fn verification(status: SigningStatus, authorities: Vec<String>) -> Verification {
    let signed = status == SigningStatus::Valid;
    let is_apple = signed && authorities.first().map_or(false, |leaf| leaf == APPLE_LEAF);
    let is_apple_dev_id = signed && !is_apple && authorities.last().map_or(false, |root| root == APPLE_ROOT);
    Verification {
        status,
        authorities,
        is_apple,
        is_apple_dev_id,
    }
}

pub struct CodesignVerifier {
    program: PathBuf,
}

impl CodesignVerifier {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for CodesignVerifier {
    fn default() -> Self {
        Self::new(CODESIGN)
    }
}

impl TrustVerifier for CodesignVerifier {
    fn verify(&self, path: &Path) -> Result<Verification, SigningError> {
        let check = run(&self.program, &["--verify", "--strict"], path)?;
        let stderr = String::from_utf8_lossy(&check.stderr);
        if !check.status.success() {
            let status = failure_status(&stderr);
            if status == SigningStatus::Unsigned {
                return Ok(verification(status, Vec::new()));
            }
            if stderr.contains("No such file") {
                return Err(SigningError::Tool {
                    path: path.to_path_buf(),
                    message: stderr.trim().to_string(),
                });
            }
            let details = run(&self.program, &["-dvvv"], path)?;
            let (authorities, _) = parse_details(&String::from_utf8_lossy(&details.stderr));
            return Ok(verification(status, authorities));
        }

        // codesign writes its display output to stderr
        let details = run(&self.program, &["-dvvv"], path)?;
        let (authorities, adhoc) = parse_details(&String::from_utf8_lossy(&details.stderr));
        let status = if adhoc { SigningStatus::AdHoc } else { SigningStatus::Valid };
        Ok(verification(status, authorities))
    }
}

pub struct CodesignEntitlements {
    program: PathBuf,
}

impl CodesignEntitlements {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }
}

impl Default for CodesignEntitlements {
    fn default() -> Self {
        Self::new(CODESIGN)
    }
}

impl EntitlementReader for CodesignEntitlements {
    fn entitlements(&self, path: &Path) -> Result<HashMap<String, Value>, SigningError> {
        let output = run(&self.program, &["-d", "--entitlements", "-", "--xml"], path)?;
        // unsigned binaries and binaries without entitlements both land here
        if !output.status.success() || output.stdout.is_empty() {
            return Ok(HashMap::new());
        }
        parse_entitlements(&output.stdout)
    }
}

/// Entitlements plist (XML) to a JSON-compatible map
pub fn parse_entitlements(plist_bytes: &[u8]) -> Result<HashMap<String, Value>, SigningError> {
    match plist::from_bytes::<plist::Value>(plist_bytes)? {
        plist::Value::Dictionary(dict) => Ok(dict.into_iter().map(|(key, value)| (key, to_json(value))).collect()),
        _ => Ok(HashMap::new()),
    }
}

fn to_json(value: plist::Value) -> Value {
    match value {
        plist::Value::String(s) => Value::String(s),
        plist::Value::Boolean(b) => Value::Bool(b),
        plist::Value::Integer(i) => match i.as_signed() {
            Some(n) => Value::from(n),
            None => Value::String(i.to_string()),
        },
        plist::Value::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        plist::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        plist::Value::Dictionary(dict) => Value::Object(dict.into_iter().map(|(k, v)| (k, to_json(v))).collect()),
        plist::Value::Data(data) => Value::String(data.iter().map(|b| format!("{:02x}", b)).collect()),
        plist::Value::Date(date) => Value::String(date.to_xml_format()),
        other => Value::String(format!("{:?}", other)),
    }
}
