//! Writer configuration: naming, size cap and injected behaviours.

use std::fmt;

/// Default cap for a single part, 10 MiB.
pub const DEFAULT_MAX_PART_BYTES: u64 = 10 * 1024 * 1024;

/// Per-line transform. `None` drops the line.
///
/// The line is handed over without its `\n` terminator; the writer appends
/// one to whatever is returned.
pub trait LineTransform: Send {
    fn apply(&mut self, line: &str) -> Option<String>;
}

impl<F> LineTransform for F
where
    F: FnMut(&str) -> Option<String> + Send,
{
    fn apply(&mut self, line: &str) -> Option<String> {
        self(line)
    }
}

/// Produces the header text for a part, given its 1-based index.
pub type HeaderFn = Box<dyn Fn(u32) -> String + Send + Sync>;

/// Produces the file name (without extension) for a part.
pub type FilenameFn = Box<dyn Fn(u32) -> String + Send + Sync>;

/// Options for one [`super::ChunkedWriter`].
pub struct ChunkedWriterConfig {
    /// Directory or key prefix for every part
    pub path: String,
    /// Base name used by the default filename generator
    pub filename: String,
    /// Extension appended to every part, without the dot
    pub extension: String,
    /// Size cap per part, in bytes, including the header
    pub max_part_bytes: u64,
    transform: Option<Box<dyn LineTransform>>,
    header: Option<HeaderFn>,
    filename_fn: Option<FilenameFn>,
}

impl Default for ChunkedWriterConfig {
    fn default() -> Self {
        Self {
            path: ".".to_string(),
            filename: "output".to_string(),
            extension: "txt".to_string(),
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            transform: None,
            header: None,
            filename_fn: None,
        }
    }
}

impl ChunkedWriterConfig {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_max_part_bytes(mut self, max_part_bytes: u64) -> Self {
        self.max_part_bytes = max_part_bytes;
        self
    }

    pub fn with_transform(mut self, transform: impl LineTransform + 'static) -> Self {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn with_header(mut self, header: impl Fn(u32) -> String + Send + Sync + 'static) -> Self {
        self.header = Some(Box::new(header));
        self
    }

    pub fn with_filename_fn(
        mut self,
        filename_fn: impl Fn(u32) -> String + Send + Sync + 'static,
    ) -> Self {
        self.filename_fn = Some(Box::new(filename_fn));
        self
    }

    /// Storage key for part `index`: `{path}/{name}.{extension}`.
    ///
    /// A path of `.` or empty places the part at the store root; an empty
    /// extension omits the dot.
    pub fn part_key(&self, index: u32) -> String {
        let name = match &self.filename_fn {
            Some(f) => f(index),
            None => format!("{}-part-{}", self.filename, index),
        };
        let file = if self.extension.is_empty() {
            name
        } else {
            format!("{}.{}", name, self.extension)
        };

        let dir = self.path.trim_start_matches("./").trim_end_matches('/');
        if dir.is_empty() || dir == "." {
            file
        } else {
            format!("{}/{}", dir, file)
        }
    }

    /// Header bytes for part `index`, newline terminated. Empty when no
    /// header is configured or the generator returns nothing.
    pub(crate) fn header_for(&self, index: u32) -> Option<String> {
        let header = self.header.as_ref().map(|f| f(index))?;
        if header.is_empty() {
            return None;
        }
        if header.ends_with('\n') {
            Some(header)
        } else {
            Some(header + "\n")
        }
    }

    pub(crate) fn transform_mut(&mut self) -> Option<&mut (dyn LineTransform + 'static)> {
        self.transform.as_deref_mut()
    }
}

impl fmt::Debug for ChunkedWriterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedWriterConfig")
            .field("path", &self.path)
            .field("filename", &self.filename)
            .field("extension", &self.extension)
            .field("max_part_bytes", &self.max_part_bytes)
            .field("transform", &self.transform.is_some())
            .field("header", &self.header.is_some())
            .field("filename_fn", &self.filename_fn.is_some())
            .finish()
    }
}
