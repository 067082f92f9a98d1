use std::path::PathBuf;

use anyhow::{Context, Result, bail};

const USAGE: &str = "usage: msgtrack-ingest [--year YYYY] [config-path]";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestArgs {
    pub config_path: Option<PathBuf>,
    pub year: Option<i32>,
}

impl IngestArgs {
    pub fn parse<I>(mut args: I) -> Result<Self>
    where
        I: Iterator<Item = String>,
    {
        let mut parsed = Self::default();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => bail!("{USAGE}"),
                "-y" | "--year" => {
                    let value = args
                        .next()
                        .with_context(|| format!("missing value for {arg} ({USAGE})"))?;
                    let year = value
                        .parse::<i32>()
                        .with_context(|| format!("invalid year: {value}"))?;
                    parsed.year = Some(year);
                }
                flag if flag.starts_with('-') && flag != "-" => {
                    bail!("unknown option: {flag} ({USAGE})");
                }
                _ if parsed.config_path.is_some() => {
                    bail!("too many arguments: {arg} ({USAGE})");
                }
                _ => parsed.config_path = Some(PathBuf::from(arg)),
            }
        }

        Ok(parsed)
    }
}
