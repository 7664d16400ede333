use super::domain::DomainName;
use super::index::DomainIndex;
use super::traits::IndexSource;
use crate::config::{DomainSource, SourceConfig};
use crate::error::{SetupError, SourceError};
use bytes::Bytes;
use reqwest::Client;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::{debug, info};

/// Textual layout of a domain list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// `<ip> <hostname>` per line; the IP column is ignored.
    Hostfile,
    /// One domain name per line.
    TextList,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Hostfile => "hostfile",
            FileFormat::TextList => "textlist",
        }
    }
}

impl FromStr for FileFormat {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hostfile" => Ok(FileFormat::Hostfile),
            "textlist" => Ok(FileFormat::TextList),
            _ => Err(SetupError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of parsing one list: the usable names plus how many lines were dropped.
#[derive(Debug, Default)]
pub struct ParsedList {
    pub domains: Vec<DomainName>,
    pub skipped: usize,
}

/// Parses raw list contents. Blank lines and `#` comments are ignored,
/// malformed lines are counted in `skipped`.
pub fn parse(raw: &[u8], format: FileFormat) -> ParsedList {
    let text = String::from_utf8_lossy(raw);
    let mut list = ParsedList::default();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = match format {
            FileFormat::Hostfile => parse_hostfile_line(line),
            FileFormat::TextList => DomainName::parse(line),
        };
        match entry {
            Some(domain) => list.domains.push(domain),
            None => list.skipped += 1,
        }
    }

    list
}

fn parse_hostfile_line(line: &str) -> Option<DomainName> {
    let line = line.split('#').next().unwrap_or_default();
    let mut columns = line.split_whitespace();
    let (ip, host) = (columns.next()?, columns.next()?);
    if columns.next().is_some() || ip.parse::<IpAddr>().is_err() {
        return None;
    }
    DomainName::parse(host)
}

/// Reads a domain list from a file or URL and turns it into a [`DomainIndex`].
pub struct SourceLoader {
    config: SourceConfig,
    client: Client,
}

impl SourceLoader {
    pub fn new(config: SourceConfig) -> Result<Self, SetupError> {
        let client = Client::builder()
            .user_agent(concat!("warnlist/", env!("CARGO_PKG_VERSION")))
            .timeout(config.fetch_timeout)
            .build()
            .map_err(SetupError::HttpClient)?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Retrieves the raw list bytes.
    pub async fn fetch(&self) -> Result<Bytes, SourceError> {
        match &self.config.source {
            DomainSource::File(path) => tokio::fs::read(path)
                .await
                .map(Bytes::from)
                .map_err(|source| SourceError::Io {
                    path: path.clone(),
                    source,
                }),
            DomainSource::Url(url) => {
                let http_err = |source| SourceError::Http {
                    url: url.to_string(),
                    source,
                };
                let resp = self
                    .client
                    .get(url.clone())
                    .send()
                    .await
                    .map_err(http_err)?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SourceError::Status {
                        url: url.to_string(),
                        status,
                    });
                }
                resp.bytes().await.map_err(http_err)
            }
        }
    }
}

#[async_trait::async_trait]
impl IndexSource for SourceLoader {
    async fn load(&self) -> Result<DomainIndex, SourceError> {
        let raw = self.fetch().await?;
        let format = self.config.format;
        let bytes = raw.len();

        let (index, parsed, skipped) = tokio::task::spawn_blocking(move || {
            let list = parse(&raw, format);
            let index = DomainIndex::build(&list.domains)?;
            Ok::<_, SourceError>((index, list.domains.len(), list.skipped))
        })
        .await??;

        if skipped > 0 {
            debug!(
                "Skipped {} malformed lines from {} ({})",
                skipped, self.config.source, format
            );
        }
        info!(
            "Parsed {} entries ({} distinct) from {} [{} bytes]",
            parsed,
            index.len(),
            self.config.source,
            bytes
        );
        Ok(index)
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.config.source, self.config.format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &ParsedList) -> Vec<&str> {
        list.domains.iter().map(DomainName::as_str).collect()
    }

    #[test]
    fn test_parse_textlist() {
        let content = "
        # Check comments
        Example.com.
        adserver.net
        # Empty line

        justadomain.com
        bad..entry
        ";

        let list = parse(content.as_bytes(), FileFormat::TextList);
        assert_eq!(
            names(&list),
            vec!["example.com", "adserver.net", "justadomain.com"]
        );
        assert_eq!(list.skipped, 1);
    }

    #[test]
    fn test_parse_hostfile() {
        let content = "
        # hosts style blocklist
        0.0.0.0 ads.example.com
        127.0.0.1\tTracker.NET.   # trailing comment
        :: v6.example.org
        0.0.0.0
        0.0.0.0 one.example two.example
        not-an-ip bad.example
        ";

        let list = parse(content.as_bytes(), FileFormat::Hostfile);
        assert_eq!(
            names(&list),
            vec!["ads.example.com", "tracker.net", "v6.example.org"]
        );
        assert_eq!(list.skipped, 3);
    }

    #[test]
    fn test_parse_skips_invalid_utf8() {
        let content = b"good.example\nbad\xff.example\n0.0.0.0 ads.example # \xfe\n";

        let list = parse(content, FileFormat::TextList);
        assert_eq!(names(&list), vec!["good.example"]);
        assert_eq!(list.skipped, 2);

        let list = parse(b"0.0.0.0 ads.example # \xfe\n0.0.0.0 x\xffy.example\n", FileFormat::Hostfile);
        assert_eq!(names(&list), vec!["ads.example"]);
        assert_eq!(list.skipped, 1);
    }

    #[test]
    fn test_parse_empty_input() {
        let list = parse(b"", FileFormat::Hostfile);
        assert!(list.domains.is_empty());
        assert_eq!(list.skipped, 0);
    }

    #[test]
    fn test_file_format_from_str() {
        assert_eq!("hostfile".parse::<FileFormat>().unwrap(), FileFormat::Hostfile);
        assert_eq!("TextList".parse::<FileFormat>().unwrap(), FileFormat::TextList);
        assert!(matches!(
            "csv".parse::<FileFormat>(),
            Err(SetupError::UnknownFormat(f)) if f == "csv"
        ));
    }
}
