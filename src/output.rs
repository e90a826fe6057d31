use crate::document::Document;
use crate::error::{Result, ScribeError};
use log::debug;
use std::io::Write;
use std::path::PathBuf;

pub const DEFAULT_FILE_NAME: &str = "doc.pdf";

/// Where a finished document goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Sent to the sink for display (`Content-Disposition: inline`).
    Inline { name: String },
    /// Sent to the sink as a download (`Content-Disposition: attachment`).
    Download { name: String },
    /// Written to a local file.
    File(PathBuf),
    /// Handed back to the caller.
    Bytes,
}

impl Destination {
    /// Parses the single-letter form: `I` (or empty), `D`, `F`, `S`.
    /// An empty `name` means [`DEFAULT_FILE_NAME`].
    pub fn from_code(code: &str, name: &str) -> Result<Self> {
        let name = if name.is_empty() { DEFAULT_FILE_NAME } else { name };
        match code.to_ascii_uppercase().as_str() {
            "" | "I" => Ok(Destination::Inline {
                name: name.to_string(),
            }),
            "D" => Ok(Destination::Download {
                name: name.to_string(),
            }),
            "F" => Ok(Destination::File(PathBuf::from(name))),
            "S" => Ok(Destination::Bytes),
            _ => Err(ScribeError::config(format!(
                "incorrect output destination: {code}"
            ))),
        }
    }
}

impl Default for Destination {
    fn default() -> Self {
        Destination::Inline {
            name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

/// Receiver of inline and download output, typically an HTTP response or
/// standard output.
pub trait OutputSink {
    /// Headless sinks (a terminal) get no headers for inline output.
    fn is_headless(&self) -> bool {
        false
    }

    /// True once anything has been written; a PDF can then no longer be sent.
    fn output_started(&self) -> bool;

    fn send_header(&mut self, name: &str, value: &str) -> Result<()>;

    fn send_body(&mut self, body: &[u8]) -> Result<()>;
}

/// Writes the document to standard output. Headers are dropped.
#[derive(Debug, Default)]
pub struct StdoutSink {
    started: bool,
}

impl OutputSink for StdoutSink {
    fn is_headless(&self) -> bool {
        true
    }

    fn output_started(&self) -> bool {
        self.started
    }

    fn send_header(&mut self, name: &str, value: &str) -> Result<()> {
        debug!("header dropped on stdout: {name}: {value}");
        Ok(())
    }

    fn send_body(&mut self, body: &[u8]) -> Result<()> {
        self.started = true;
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(body)
            .and_then(|_| stdout.flush())
            .map_err(|err| ScribeError::environment(format!("cannot write to stdout: {err}")))
    }
}

/// Collects headers and body in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub headless: bool,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MemorySink {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl OutputSink for MemorySink {
    fn is_headless(&self) -> bool {
        self.headless
    }

    fn output_started(&self) -> bool {
        !self.body.is_empty()
    }

    fn send_header(&mut self, name: &str, value: &str) -> Result<()> {
        self.headers.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn send_body(&mut self, body: &[u8]) -> Result<()> {
        self.body.extend_from_slice(body);
        Ok(())
    }
}

/// `filename="…"` for ASCII names, RFC 5987 `filename*=UTF-8''…` otherwise.
pub(crate) fn disposition_filename(name: &str) -> String {
    if name.is_ascii() {
        return format!("filename=\"{name}\"");
    }
    let mut encoded = String::with_capacity(name.len() * 3);
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            encoded.push(b as char);
        } else {
            encoded.push_str(&format!("%{b:02X}"));
        }
    }
    format!("filename*=UTF-8''{encoded}")
}

impl Document {
    /// Closes the document and sends it to `destination`, writing inline and
    /// download output to standard output. Returns the bytes for
    /// [`Destination::Bytes`].
    pub fn output(&mut self, destination: &Destination) -> Result<Option<Vec<u8>>> {
        self.output_to(destination, &mut StdoutSink::default())
    }

    /// Closes the document and returns the finished file.
    pub fn output_bytes(&mut self) -> Result<Vec<u8>> {
        self.close()?;
        self.finished().map(<[u8]>::to_vec)
    }

    pub fn output_to(
        &mut self,
        destination: &Destination,
        sink: &mut dyn OutputSink,
    ) -> Result<Option<Vec<u8>>> {
        self.close()?;
        let bytes = self.finished()?;
        match destination {
            Destination::Inline { name } => {
                check_sink(sink)?;
                if !sink.is_headless() {
                    sink.send_header("Content-Type", "application/pdf")?;
                    send_cache_headers(sink, "inline", name)?;
                }
                sink.send_body(bytes)?;
                Ok(None)
            }
            Destination::Download { name } => {
                check_sink(sink)?;
                sink.send_header("Content-Type", "application/x-download")?;
                send_cache_headers(sink, "attachment", name)?;
                sink.send_body(bytes)?;
                Ok(None)
            }
            Destination::File(path) => {
                std::fs::write(path, bytes).map_err(|err| {
                    ScribeError::environment(format!(
                        "unable to create output file {}: {err}",
                        path.display()
                    ))
                })?;
                debug!("wrote {} bytes to {}", bytes.len(), path.display());
                Ok(None)
            }
            Destination::Bytes => Ok(Some(bytes.to_vec())),
        }
    }

    fn finished(&self) -> Result<&[u8]> {
        self.as_bytes()
            .ok_or_else(|| ScribeError::state("the document is not closed"))
    }
}

fn check_sink(sink: &dyn OutputSink) -> Result<()> {
    if sink.output_started() {
        return Err(ScribeError::environment(
            "some data has already been output, can't send PDF file",
        ));
    }
    Ok(())
}

fn send_cache_headers(sink: &mut dyn OutputSink, disposition: &str, name: &str) -> Result<()> {
    sink.send_header(
        "Content-Disposition",
        &format!("{disposition}; {}", disposition_filename(name)),
    )?;
    sink.send_header("Cache-Control", "private, max-age=0, must-revalidate")?;
    sink.send_header("Pragma", "public")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Orientation, PageFormat, Unit};

    fn doc() -> Document {
        let mut doc = Document::new(Orientation::Portrait, Unit::Millimeter, PageFormat::A4).unwrap();
        doc.add_page().unwrap();
        doc
    }

    #[test]
    fn codes_parse() {
        assert_eq!(Destination::from_code("", "").unwrap(), Destination::default());
        assert_eq!(
            Destination::from_code("d", "x.pdf").unwrap(),
            Destination::Download {
                name: "x.pdf".to_string()
            }
        );
        assert_eq!(Destination::from_code("S", "").unwrap(), Destination::Bytes);
        assert_eq!(
            Destination::from_code("F", "out.pdf").unwrap(),
            Destination::File(PathBuf::from("out.pdf"))
        );
        let err = Destination::from_code("X", "").unwrap_err();
        assert!(matches!(err, ScribeError::Configuration(_)));
    }

    #[test]
    fn bytes_destination_returns_the_file() {
        let mut doc = doc();
        let bytes = doc.output(&Destination::Bytes).unwrap().unwrap();
        assert!(bytes.starts_with(b"%PDF-"));
        assert!(bytes.ends_with(b"%%EOF"));
        assert_eq!(doc.output_bytes().unwrap(), bytes);
    }

    #[test]
    fn inline_output_sends_headers() {
        let mut doc = doc();
        let mut sink = MemorySink::default();
        let dest = Destination::Inline {
            name: "report.pdf".to_string(),
        };
        assert!(doc.output_to(&dest, &mut sink).unwrap().is_none());
        assert_eq!(sink.header("content-type"), Some("application/pdf"));
        assert_eq!(
            sink.header("Content-Disposition"),
            Some("inline; filename=\"report.pdf\"")
        );
        assert_eq!(sink.header("Pragma"), Some("public"));
        assert!(sink.body.starts_with(b"%PDF-"));
    }

    #[test]
    fn headless_inline_output_skips_headers() {
        let mut doc = doc();
        let mut sink = MemorySink {
            headless: true,
            ..MemorySink::default()
        };
        doc.output_to(&Destination::default(), &mut sink).unwrap();
        assert!(sink.headers.is_empty());
        assert!(!sink.body.is_empty());
    }

    #[test]
    fn download_uses_attachment_and_rfc5987_names() {
        let mut doc = doc();
        let mut sink = MemorySink::default();
        let dest = Destination::Download {
            name: "résumé.pdf".to_string(),
        };
        doc.output_to(&dest, &mut sink).unwrap();
        assert_eq!(sink.header("Content-Type"), Some("application/x-download"));
        assert_eq!(
            sink.header("Content-Disposition"),
            Some("attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf")
        );
    }

    #[test]
    fn started_sink_is_an_environment_error() {
        let mut doc = doc();
        let mut sink = MemorySink {
            body: b"oops".to_vec(),
            ..MemorySink::default()
        };
        let err = doc.output_to(&Destination::default(), &mut sink).unwrap_err();
        assert!(matches!(err, ScribeError::Environment(_)));
    }

    #[test]
    fn file_destination_writes_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        let mut doc = doc();
        doc.output(&Destination::File(path.clone())).unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(Some(written.as_slice()), doc.as_bytes());
    }

    #[test]
    fn unwritable_file_is_an_environment_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.pdf");
        let mut doc = doc();
        let err = doc.output(&Destination::File(path)).unwrap_err();
        assert!(matches!(err, ScribeError::Environment(_)));
    }
}
