/// In-memory OPC package backed by a zip archive.
///
/// The package holds every part as raw bytes, indexed by part name. The
/// replacement engine reads parts, rewrites them, and writes them back;
/// nothing touches the disk until [`Package::save_as`] or
/// [`Package::write_to`] is called.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use zip::ZipArchive;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::opc::constants::{content_type, namespace, part_name};
use crate::opc::error::{OpcError, Result};
use crate::xml::XmlTree;

/// Main API class for working with OPC packages.
///
/// Part names are stored without a leading slash (`word/document.xml`), the
/// same form they have inside the zip archive.
pub struct Package {
    /// All parts in the package, indexed by part name.
    parts: BTreeMap<String, Vec<u8>>,
}

impl Package {
    /// Create a new empty OPC package.
    pub fn new() -> Self {
        Self {
            parts: BTreeMap::new(),
        }
    }

    /// Open an OPC package from a file.
    ///
    /// # Arguments
    /// * `path` - Path to the package file (.docx)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Load an OPC package from a reader.
    ///
    /// # Arguments
    /// * `reader` - A reader that implements Read + Seek
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let mut parts = BTreeMap::new();

        for i in 0..archive.len() {
            let mut file = archive.by_index(i)?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.insert(name, data);
        }

        Ok(Self { parts })
    }

    /// Read a part's bytes, or `None` if the part does not exist.
    #[inline]
    pub fn read_part(&self, name: &str) -> Option<&[u8]> {
        self.parts.get(name).map(|v| v.as_slice())
    }

    /// Write (or overwrite) a part.
    pub fn write_part(&mut self, name: &str, data: impl Into<Vec<u8>>) {
        self.parts.insert(name.to_string(), data.into());
    }

    /// Check if a part exists in the package.
    #[inline]
    pub fn contains_part(&self, name: &str) -> bool {
        self.parts.contains_key(name)
    }

    /// Iterate over all part names, in stable (sorted) order.
    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(|s| s.as_str())
    }

    /// Get the number of parts in the package.
    #[inline]
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Add a binary media part under `word/media/` and return its part name.
    ///
    /// The part is named `imageN.<ext>` where N is one greater than the
    /// highest number already in use (1 if none). A `Default` content type
    /// for the extension is registered in `[Content_Types].xml` so the
    /// resulting package stays valid.
    pub fn add_media(&mut self, data: Vec<u8>, ext: &str) -> Result<String> {
        let mut max_n = 0u32;
        for name in self.parts.keys() {
            if let Some(rest) = name.strip_prefix("word/media/image") {
                let digits = rest.split('.').next().unwrap_or("");
                if let Ok(n) = atoi_simd::parse::<u32>(digits.as_bytes()) {
                    max_n = max_n.max(n);
                }
            }
        }
        let media_name = format!("word/media/image{}.{}", max_n + 1, ext);
        self.parts.insert(media_name.clone(), data);
        self.register_default_content_type(ext)?;
        Ok(media_name)
    }

    /// Ensure `[Content_Types].xml` carries a `Default` entry for `ext`.
    fn register_default_content_type(&mut self, ext: &str) -> Result<()> {
        let mut tree = match self.read_part(part_name::CONTENT_TYPES) {
            Some(bytes) => XmlTree::parse(bytes)
                .map_err(|e| OpcError::InvalidPackage(format!("[Content_Types].xml: {}", e)))?,
            None => XmlTree::new(),
        };

        let types = match tree.root_element() {
            Some(root) => root,
            None => {
                let root = tree.create_element("Types");
                tree.set_attr(root, "xmlns", namespace::CONTENT_TYPES);
                tree.append_root(root);
                root
            },
        };

        let already = tree.children_named(types, "Default").any(|d| {
            tree.attr(d, "Extension")
                .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        });
        if already {
            return Ok(());
        }

        let default = tree.create_element("Default");
        tree.set_attr(default, "Extension", ext);
        tree.set_attr(default, "ContentType", content_type_for_extension(ext));
        tree.append_child(types, default);

        self.write_part(part_name::CONTENT_TYPES, tree.serialize());
        Ok(())
    }

    /// Write the package to a file on disk.
    pub fn save_as<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Write the package to any writer as a zip archive.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default();
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        zip.finish()?;
        Ok(())
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a media file extension to its content type.
fn content_type_for_extension(ext: &str) -> &'static str {
    if ext.eq_ignore_ascii_case("png") {
        content_type::PNG
    } else if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
        content_type::JPEG
    } else if ext.eq_ignore_ascii_case("gif") {
        content_type::GIF
    } else if ext.eq_ignore_ascii_case("bmp") {
        content_type::BMP
    } else if ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff") {
        content_type::TIFF
    } else {
        "application/octet-stream"
    }
}
