use std::fmt;
use std::str::FromStr;

/// The two interchangeable on-disk cache representations. Either can serve
/// any cache directory; the format only affects how bytes are laid out, not
/// the queries a server can answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheFormat {
    /// A single embedded `sled` database holding one record.
    Kv,
    /// A plain JSON file, human-readable and diffable.
    Json,
}

impl CacheFormat {
    pub const fn tag(self) -> &'static str {
        match self {
            CacheFormat::Kv => "pogreb.v1",
            CacheFormat::Json => "json",
        }
    }
}

impl FromStr for CacheFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pogreb.v1" | "sled.v1" | "kv" => Ok(CacheFormat::Kv),
            "json" => Ok(CacheFormat::Json),
            other => Err(format!("unknown cache format {other:?}, expected \"pogreb.v1\" or \"json\"")),
        }
    }
}

impl fmt::Display for CacheFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
