use std::{
    fmt, fs,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::{Context as _, bail};
use tracing::{debug, instrument, trace};

pub const SERIAL_PROPERTY_TOOL: &str = "getprop";
pub const SERIAL_PROPERTY_NAME: &str = "ro.serialno";
pub const DMI_PRODUCT_SERIAL_PATH: &str = "/sys/class/dmi/id/product_serial";

/// Lowercased device identifier resolved for a single check cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Trims surrounding whitespace and lowercases the raw value. Returns
    /// `None` if nothing is left.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        Some(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single strategy for reading the device serial number.
///
/// Implementations return the raw value as reported by the system; the
/// resolver takes care of trimming and lowercasing.
pub trait IdentitySource: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self) -> anyhow::Result<String>;
}

/// Reads the serial number from a platform property tool (`getprop ro.serialno`).
#[derive(Debug, Clone)]
pub struct PropertyToolSource {
    program: String,
    property: String,
}

impl PropertyToolSource {
    pub fn new(program: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            property: property.into(),
        }
    }
}

impl Default for PropertyToolSource {
    fn default() -> Self {
        Self::new(SERIAL_PROPERTY_TOOL, SERIAL_PROPERTY_NAME)
    }
}

impl IdentitySource for PropertyToolSource {
    fn name(&self) -> &str {
        "property tool"
    }

    #[instrument(level = "trace", skip(self), fields(program = %self.program, property = %self.property))]
    fn read(&self) -> anyhow::Result<String> {
        let output = Command::new(&self.program)
            .arg(&self.property)
            .output()
            .with_context(|| format!("Failed to run {} {}", self.program, self.property))?;

        if !output.status.success() {
            bail!(
                "{} {} exited with {}",
                self.program,
                self.property,
                output.status
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reads the serial number from the DMI product serial descriptor.
#[derive(Debug, Clone)]
pub struct DmiSerialSource {
    path: PathBuf,
}

impl DmiSerialSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for DmiSerialSource {
    fn default() -> Self {
        Self::new(DMI_PRODUCT_SERIAL_PATH)
    }
}

impl IdentitySource for DmiSerialSource {
    fn name(&self) -> &str {
        "DMI product serial"
    }

    #[instrument(level = "trace", skip(self), fields(path = %self.path.display()))]
    fn read(&self) -> anyhow::Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }
}

/// Resolves the device identity by trying each source in order. The first
/// source producing a non-empty value wins and later sources are not invoked.
pub struct IdentityResolver {
    sources: Vec<Box<dyn IdentitySource>>,
}

impl IdentityResolver {
    pub fn new(sources: Vec<Box<dyn IdentitySource>>) -> Self {
        Self { sources }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn resolve(&self) -> Option<DeviceIdentity> {
        for source in &self.sources {
            match source.read() {
                Ok(raw) => {
                    if let Some(identity) = DeviceIdentity::from_raw(&raw) {
                        trace!(source = source.name(), %identity, "Resolved device identity");
                        return Some(identity);
                    }
                    debug!(source = source.name(), "Identity source returned an empty value");
                }
                Err(err) => {
                    debug!(source = source.name(), "Identity source failed: {err:#}");
                }
            }
        }

        None
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(PropertyToolSource::default()),
            Box::new(DmiSerialSource::default()),
        ])
    }
}

impl fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|source| source.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write as _,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use anyhow::anyhow;

    use super::*;

    struct StubSource {
        value: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    impl StubSource {
        fn boxed(value: Option<&'static str>) -> (Box<dyn IdentitySource>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let source = Self {
                value,
                calls: Arc::clone(&calls),
            };
            (Box::new(source), calls)
        }
    }

    impl IdentitySource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        fn read(&self) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.value
                .map(str::to_string)
                .ok_or_else(|| anyhow!("stub source unavailable"))
        }
    }

    #[test]
    fn first_source_short_circuits_fallback() {
        let (primary, primary_calls) = StubSource::boxed(Some("B2A9BE8C7159D8DE\n"));
        let (fallback, fallback_calls) = StubSource::boxed(Some("other"));

        let resolver = IdentityResolver::new(vec![primary, fallback]);

        let identity = resolver.resolve().expect("identity should resolve");
        assert_eq!(identity.as_str(), "b2a9be8c7159d8de");
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn whitespace_only_value_falls_back() {
        let (primary, _) = StubSource::boxed(Some(" \n\t "));
        let (fallback, fallback_calls) = StubSource::boxed(Some("  F28FA9CB89609E6E  \n"));

        let resolver = IdentityResolver::new(vec![primary, fallback]);

        assert_eq!(
            resolver.resolve().map(|identity| identity.to_string()),
            Some("f28fa9cb89609e6e".to_string())
        );
        assert_eq!(fallback_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_source_falls_back() {
        let (primary, _) = StubSource::boxed(None);
        let (fallback, _) = StubSource::boxed(Some("LincosDemo-7"));

        let resolver = IdentityResolver::new(vec![primary, fallback]);

        assert_eq!(resolver.resolve().unwrap().as_str(), "lincosdemo-7");
    }

    #[test]
    fn all_sources_failing_yields_none() {
        let (primary, _) = StubSource::boxed(None);
        let (fallback, _) = StubSource::boxed(Some(""));

        let resolver = IdentityResolver::new(vec![primary, fallback]);

        assert!(resolver.resolve().is_none());
    }

    #[test]
    fn property_tool_output_is_used() {
        let source = PropertyToolSource::new("echo", "  ABC123  ");
        let resolver = IdentityResolver::new(vec![Box::new(source)]);

        assert_eq!(resolver.resolve().unwrap().as_str(), "abc123");
    }

    #[test]
    fn property_tool_missing_or_failing_is_an_error() {
        assert!(
            PropertyToolSource::new("/nonexistent/nodelock-getprop", "ro.serialno")
                .read()
                .is_err()
        );
        assert!(PropertyToolSource::new("false", "ro.serialno").read().is_err());
    }

    #[test]
    fn dmi_file_used_when_property_tool_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  B2A9BE8C7159D8DE  ").unwrap();

        let resolver = IdentityResolver::new(vec![
            Box::new(PropertyToolSource::new("false", "ro.serialno")),
            Box::new(DmiSerialSource::new(file.path())),
        ]);

        assert_eq!(resolver.resolve().unwrap().as_str(), "b2a9be8c7159d8de");
    }

    #[test]
    fn missing_dmi_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = DmiSerialSource::new(dir.path().join("product_serial"));

        assert!(source.read().is_err());
    }
}
