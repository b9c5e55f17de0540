//! Typed arguments and results of the command vocabulary

use crate::constants::fields;
use crate::dialect::scan_version;
use crate::error::{Error, Result};
use crate::protocol::ResultRecord;
use crate::value::{Lookup, Tuple, Value, ValueError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;

/// How much of each variable a stack listing includes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrintValues {
    NoValues,
    AllValues,
    SimpleValues,
}

impl PrintValues {
    pub fn as_mi(self) -> u8 {
        match self {
            PrintValues::NoValues => 0,
            PrintValues::AllValues => 1,
            PrintValues::SimpleValues => 2,
        }
    }
}

/// Display format of a variable object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VarFormat {
    Natural,
    Binary,
    Decimal,
    Hexadecimal,
    Octal,
    ZeroHexadecimal,
}

impl VarFormat {
    pub fn as_mi(self) -> &'static str {
        match self {
            VarFormat::Natural => "natural",
            VarFormat::Binary => "binary",
            VarFormat::Decimal => "decimal",
            VarFormat::Hexadecimal => "hexadecimal",
            VarFormat::Octal => "octal",
            VarFormat::ZeroHexadecimal => "zero-hexadecimal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionCategory {
    /// Managed exceptions
    Clr,
    /// Managed debugging assistants
    Mda,
}

/// When an exception breakpoint fires. The empty set means "unhandled only".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExceptionBreakState(u8);

impl ExceptionBreakState {
    pub const UNHANDLED: Self = Self(0);
    pub const THROWN: Self = Self(1);
    pub const USER_UNHANDLED: Self = Self(2);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn as_mi(self) -> &'static str {
        match (
            self.contains(Self::THROWN),
            self.contains(Self::USER_UNHANDLED),
        ) {
            (true, true) => "throw+user-unhandled",
            (true, false) => "throw",
            (false, true) => "user-unhandled",
            (false, false) => "unhandled",
        }
    }
}

impl BitOr for ExceptionBreakState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetArchitecture {
    #[default]
    Unknown,
    Arm,
    Arm64,
    X86,
    X64,
    Mips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
            HashAlgorithm::Sha256 => 32,
        }
    }

    fn flag(self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "--MD5checksum",
            HashAlgorithm::Sha1 => "--SHA1checksum",
            HashAlgorithm::Sha256 => "--SHA256checksum",
        }
    }
}

/// Source file digest the debugger matches before binding a breakpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub bytes: Vec<u8>,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn from_hex(algorithm: HashAlgorithm, text: &str) -> Result<Self> {
        let bytes = hex::decode(text)
            .map_err(|e| Error::InvalidArgument(format!("invalid checksum '{}': {}", text, e)))?;
        Ok(Self { algorithm, bytes })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

/// `--<ALG>checksum h1,h2 ...` groups, algorithms in first-seen order
pub(crate) fn checksum_arguments(checksums: &[Checksum]) -> String {
    let mut groups: Vec<(HashAlgorithm, Vec<String>)> = Vec::new();
    for checksum in checksums {
        let hex = checksum.to_hex();
        match groups.iter_mut().find(|(alg, _)| *alg == checksum.algorithm) {
            Some((_, values)) => values.push(hex),
            None => groups.push((checksum.algorithm, vec![hex])),
        }
    }
    groups
        .iter()
        .map(|(alg, values)| format!("{} {}", alg.flag(), values.join(",")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where a breakpoint goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakLocation {
    Line { file: String, line: u32 },
    Function(String),
    Address(u64),
}

impl BreakLocation {
    pub(crate) fn to_mi(&self) -> String {
        match self {
            BreakLocation::Line { file, line } => format!("{}:{}", file, line),
            BreakLocation::Function(name) => name.clone(),
            BreakLocation::Address(addr) => format!("*0x{:x}", addr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakOptions {
    pub condition: Option<String>,
    pub enabled: bool,
    /// Only honoured by backends with breakpoint checksum support
    pub checksums: Vec<Checksum>,
}

impl Default for BreakOptions {
    fn default() -> Self {
        Self {
            condition: None,
            enabled: true,
            checksums: Vec::new(),
        }
    }
}

/// Version reported by `-gdb-version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>,
    /// First line of the banner
    pub banner: String,
}

impl DebuggerVersion {
    pub fn scan(text: &str) -> Option<Self> {
        let banner = text.lines().find(|l| !l.trim().is_empty())?;
        let (major, minor, patch) = scan_version(banner)?;
        Some(Self {
            major,
            minor,
            patch,
            banner: banner.trim().to_string(),
        })
    }

    pub fn at_least(&self, (major, minor): (u32, u32)) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for DebuggerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.patch {
            Some(patch) => write!(f, "{}.{}.{}", self.major, self.minor, patch),
            None => write!(f, "{}.{}", self.major, self.minor),
        }
    }
}

/// One stack frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub level: u32,
    pub addr: Option<u64>,
    pub func: Option<String>,
    pub file: Option<String>,
    pub fullname: Option<String>,
    pub line: Option<u32>,
    /// Everything the debugger sent, for fields not projected here
    pub raw: Tuple,
}

impl Frame {
    pub fn from_value(value: &Value) -> std::result::Result<Self, ValueError> {
        let tuple = value.require_tuple(fields::FRAME)?;
        Self::from_tuple(tuple)
    }

    pub fn from_tuple(tuple: &Tuple) -> std::result::Result<Self, ValueError> {
        Ok(Self {
            level: tuple.try_find_u32("level").unwrap_or(0),
            addr: tuple.try_find_addr("addr"),
            func: tuple.try_find_str("func"),
            file: tuple.try_find_str("file"),
            fullname: tuple.try_find_str("fullname"),
            line: tuple.try_find_u32("line"),
            raw: tuple.clone(),
        })
    }
}

/// `-thread-info` projection
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadsInfo {
    pub threads: Vec<Tuple>,
    pub current_thread_id: Option<u32>,
}

impl ThreadsInfo {
    pub(crate) fn from_record(record: &ResultRecord) -> std::result::Result<Self, ValueError> {
        let threads = match record.try_find("threads").and_then(Value::as_list) {
            Some(list) => list
                .values()
                .into_iter()
                .map(|v| v.require_tuple("threads").cloned())
                .collect::<std::result::Result<_, _>>()?,
            None => Vec::new(),
        };
        Ok(Self {
            threads,
            current_thread_id: record.try_find_u32("current-thread-id"),
        })
    }
}

/// A freshly created variable object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarObject {
    pub name: String,
    pub numchild: u32,
    pub value: Option<String>,
    pub type_name: Option<String>,
    pub thread_id: Option<u32>,
}

impl VarObject {
    pub(crate) fn from_record(record: &ResultRecord) -> Result<Self> {
        Ok(Self {
            name: record.find_str("name")?,
            numchild: record.try_find_u32("numchild").unwrap_or(0),
            value: record.try_find_str(fields::VALUE),
            type_name: record.try_find_str("type"),
            thread_id: record.try_find_u32(fields::THREAD_ID),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use crate::protocol::Reply;

    fn record(line: &str) -> ResultRecord {
        match parse_line(line).unwrap() {
            Reply::Result(record) => record,
            other => panic!("expected result record, got {:?}", other),
        }
    }

    #[test]
    fn test_exception_state_text() {
        use ExceptionBreakState as S;
        assert_eq!(S::UNHANDLED.as_mi(), "unhandled");
        assert_eq!(S::THROWN.as_mi(), "throw");
        assert_eq!(S::USER_UNHANDLED.as_mi(), "user-unhandled");
        assert_eq!((S::THROWN | S::USER_UNHANDLED).as_mi(), "throw+user-unhandled");
    }

    #[test]
    fn test_checksum_hex_is_lowercase() {
        let sum = Checksum::from_hex(HashAlgorithm::Md5, "DEADBEEF").unwrap();
        assert_eq!(sum.to_hex(), "deadbeef");
        assert!(Checksum::from_hex(HashAlgorithm::Md5, "xyz").is_err());
    }

    #[test]
    fn test_checksum_grouping() {
        let sums = vec![
            Checksum::new(HashAlgorithm::Sha256, vec![0x01]),
            Checksum::new(HashAlgorithm::Sha256, vec![0xab]),
        ];
        assert_eq!(checksum_arguments(&sums), "--SHA256checksum 01,ab");
        assert_eq!(checksum_arguments(&[]), "");
    }

    #[test]
    fn test_break_location_text() {
        assert_eq!(
            BreakLocation::Address(0x401000).to_mi(),
            "*0x401000"
        );
        assert_eq!(
            BreakLocation::Line {
                file: "src/main.c".to_string(),
                line: 3
            }
            .to_mi(),
            "src/main.c:3"
        );
    }

    #[test]
    fn test_version_scan_uses_first_line() {
        let version =
            DebuggerVersion::scan("GNU gdb (GDB) 13.2\nCopyright (C) 2023 Free Software Foundation, Inc.\n")
                .unwrap();
        assert_eq!((version.major, version.minor, version.patch), (13, 2, None));
        assert_eq!(version.banner, "GNU gdb (GDB) 13.2");
        assert!(version.at_least((7, 8)));
        assert!(!version.at_least((14, 0)));
        assert_eq!(version.to_string(), "13.2");
    }

    #[test]
    fn test_frame_projection() {
        let r = record(
            r#"^done,frame={level="1",addr="0x0000000000401136",func="main",file="a.c",fullname="/src/a.c",line="12"}"#,
        );
        let frame = Frame::from_tuple(r.find_tuple("frame").unwrap()).unwrap();
        assert_eq!(frame.level, 1);
        assert_eq!(frame.addr, Some(0x401136));
        assert_eq!(frame.func.as_deref(), Some("main"));
        assert_eq!(frame.line, Some(12));
    }

    #[test]
    fn test_threads_info() {
        let r = record(r#"^done,threads=[{id="1",target-id="Thread 0x7f"},{id="2"}],current-thread-id="2""#);
        let info = ThreadsInfo::from_record(&r).unwrap();
        assert_eq!(info.threads.len(), 2);
        assert_eq!(info.current_thread_id, Some(2));

        let junk = record(r#"^done,threads=[{id="1"},"junk"]"#);
        assert!(matches!(
            ThreadsInfo::from_record(&junk),
            Err(ValueError::WrongShape { .. })
        ));
    }

    #[test]
    fn test_var_object() {
        let r = record(r#"^done,name="var1",numchild="0",value="42",type="int",thread-id="1",has_more="0""#);
        let var = VarObject::from_record(&r).unwrap();
        assert_eq!(var.name, "var1");
        assert_eq!(var.value.as_deref(), Some("42"));
        assert_eq!(var.type_name.as_deref(), Some("int"));
    }
}
