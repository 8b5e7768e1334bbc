// src/repository/parsers/rpmmd.rs

//! rpm-md (yum) repository metadata parser
//!
//! Reads `repodata/repomd.xml` to find the primary metadata file, verifies
//! its checksum, decompresses it and extracts every package together with
//! its provides/requires/conflicts/obsoletes entries.

use super::{ChecksumType, PackageMetadata, Relation, RelationKind, RepositoryMetadata};
use crate::error::{Error, Result};
use crate::repository::{RepositoryClient, join_url};
use crate::version::{RpmVersion, VersionConstraint};
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use tracing::{debug, info, warn};

/// What repomd.xml says about the primary metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepomdInfo {
    pub revision: Option<String>,
    /// Path of primary.xml relative to the repository root
    pub primary_location: String,
    pub primary_checksum: Option<(ChecksumType, String)>,
}

/// Download and parse the metadata of the repository at `base_url`
pub fn fetch_metadata(client: &RepositoryClient, base_url: &str) -> Result<RepositoryMetadata> {
    let repomd_url = join_url(base_url, "repodata/repomd.xml");
    debug!("Downloading repomd.xml from: {}", repomd_url);

    let repomd = client.fetch_bytes(&repomd_url)?;
    let repomd = String::from_utf8(repomd)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in repomd.xml: {}", e)))?;
    let info = parse_repomd(&repomd)?;

    let primary_url = join_url(base_url, &info.primary_location);
    debug!("Downloading primary metadata from: {}", primary_url);
    let bytes = client.fetch_bytes(&primary_url)?;

    if let Some((checksum_type, expected)) = &info.primary_checksum {
        verify_checksum(&bytes, checksum_type, expected)?;
    }

    let xml = decompress(&info.primary_location, &bytes)?;
    let packages = parse_primary(&xml)?;

    info!(
        "Parsed {} packages from {} (revision {})",
        packages.len(),
        base_url,
        info.revision.as_deref().unwrap_or("unknown")
    );

    Ok(RepositoryMetadata {
        revision: info.revision,
        packages,
    })
}

/// Parse repomd.xml and locate the primary data file
pub fn parse_repomd(xml: &str) -> Result<RepomdInfo> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut revision = None;
    let mut location = None;
    let mut checksum_type = None;
    let mut checksum = None;
    let mut in_primary = false;
    let mut current_tag = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                current_tag = e.local_name().as_ref().to_vec();
                match current_tag.as_slice() {
                    b"data" => in_primary = attribute(&e, b"type").as_deref() == Some("primary"),
                    b"checksum" if in_primary => checksum_type = attribute(&e, b"type"),
                    b"location" if in_primary => location = attribute(&e, b"href"),
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if in_primary && e.local_name().as_ref() == b"location" {
                    location = attribute(&e, b"href");
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::ParseError(format!("Failed to parse repomd.xml: {}", e)))?
                    .to_string();
                match current_tag.as_slice() {
                    b"revision" => revision = Some(text),
                    b"checksum" if in_primary => checksum = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"data" {
                    in_primary = false;
                }
                current_tag.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse repomd.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    let primary_location = location.ok_or_else(|| {
        Error::ParseError("Could not find primary data location in repomd.xml".to_string())
    })?;

    Ok(RepomdInfo {
        revision,
        primary_location,
        primary_checksum: checksum
            .map(|value| (ChecksumType::from_name(checksum_type.as_deref().unwrap_or("sha256")), value)),
    })
}

/// Check downloaded bytes against the checksum published in repomd.xml
pub fn verify_checksum(bytes: &[u8], checksum_type: &ChecksumType, expected: &str) -> Result<()> {
    let actual = match checksum_type {
        ChecksumType::Sha256 => format!("{:x}", Sha256::digest(bytes)),
        ChecksumType::Sha512 => format!("{:x}", Sha512::digest(bytes)),
        ChecksumType::Other(name) => {
            debug!("Not verifying {} checksum of primary metadata", name);
            return Ok(());
        }
    };

    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(Error::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Decompress primary metadata according to its file extension
pub fn decompress(location: &str, bytes: &[u8]) -> Result<String> {
    let raw = if location.ends_with(".zst") {
        debug!("Decompressing zstd-compressed primary.xml");
        zstd::decode_all(bytes)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?
    } else if location.ends_with(".gz") {
        debug!("Decompressing gzip-compressed primary.xml");
        let mut decompressed = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut decompressed)
            .map_err(|e| Error::ParseError(format!("Failed to decompress {}: {}", location, e)))?;
        decompressed
    } else if location.ends_with(".xml") {
        bytes.to_vec()
    } else {
        return Err(Error::ParseError(format!(
            "Unsupported compression for {}",
            location
        )));
    };

    String::from_utf8(raw)
        .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in {}: {}", location, e)))
}

/// Parse primary.xml into package metadata
pub fn parse_primary(xml: &str) -> Result<Vec<PackageMetadata>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut state = PrimaryState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                state.current_tag = e.local_name().as_ref().to_vec();
                state.open(&e)?;
            }
            Ok(Event::Empty(e)) => {
                state.open(&e)?;
                state.close(e.local_name().as_ref());
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::ParseError(format!("Failed to parse primary.xml: {}", e)))?;
                state.text(&text);
            }
            Ok(Event::End(e)) => state.close(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse primary.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(state.packages)
}

#[derive(Default)]
struct PrimaryState {
    packages: Vec<PackageMetadata>,
    current: Option<PackageBuilder>,
    current_tag: Vec<u8>,
    relation_kind: Option<RelationKind>,
}

impl PrimaryState {
    fn open(&mut self, e: &BytesStart) -> Result<()> {
        let local = e.local_name();
        let name = local.as_ref();

        if name == b"package" {
            self.current = Some(PackageBuilder::default());
            return Ok(());
        }

        let Some(pkg) = self.current.as_mut() else {
            return Ok(());
        };

        match name {
            b"version" if self.relation_kind.is_none() => {
                pkg.epoch = attribute(e, b"epoch");
                pkg.ver = attribute(e, b"ver");
                pkg.rel = attribute(e, b"rel");
            }
            b"checksum" => pkg.checksum_type = attribute(e, b"type"),
            b"size" => pkg.size = attribute(e, b"package"),
            b"location" => pkg.location = attribute(e, b"href"),
            b"provides" => self.relation_kind = Some(RelationKind::Provides),
            b"requires" => self.relation_kind = Some(RelationKind::Requires),
            b"conflicts" => self.relation_kind = Some(RelationKind::Conflicts),
            b"obsoletes" => self.relation_kind = Some(RelationKind::Obsoletes),
            b"entry" => {
                if let Some(kind) = self.relation_kind {
                    if let Some(relation) = relation_from_entry(e, kind)? {
                        pkg.relations.push(relation);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        let Some(pkg) = self.current.as_mut() else {
            return;
        };
        match self.current_tag.as_slice() {
            b"name" => pkg.name = Some(text.to_string()),
            b"arch" => pkg.arch = Some(text.to_string()),
            b"summary" => pkg.summary = Some(text.to_string()),
            b"checksum" => pkg.checksum = Some(text.to_string()),
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        self.current_tag.clear();
        match name {
            b"package" => {
                if let Some(builder) = self.current.take() {
                    match builder.build() {
                        Ok(pkg) => self.packages.push(pkg),
                        Err(e) => warn!("Skipping malformed package entry: {}", e),
                    }
                }
            }
            b"provides" | b"requires" | b"conflicts" | b"obsoletes" => self.relation_kind = None,
            _ => {}
        }
    }
}

/// Builder for constructing PackageMetadata from XML parsing
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    summary: Option<String>,
    checksum: Option<String>,
    checksum_type: Option<String>,
    size: Option<String>,
    location: Option<String>,
    relations: Vec<Relation>,
}

impl PackageBuilder {
    fn build(self) -> Result<PackageMetadata> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let version = self
            .ver
            .ok_or_else(|| Error::ParseError(format!("Missing version for {}", name)))?;
        let release = self
            .rel
            .ok_or_else(|| Error::ParseError(format!("Missing release for {}", name)))?;
        let epoch = parse_epoch(self.epoch.as_deref())?;

        let size = match self.size {
            Some(size) => size
                .parse()
                .map_err(|e| Error::ParseError(format!("Invalid size for {}: {}", name, e)))?,
            None => 0,
        };

        let location = self
            .location
            .ok_or_else(|| Error::ParseError(format!("Missing location for {}", name)))?;

        Ok(PackageMetadata {
            name,
            epoch,
            version,
            release,
            architecture: self.arch,
            summary: self.summary,
            checksum: self.checksum.unwrap_or_default(),
            checksum_type: ChecksumType::from_name(self.checksum_type.as_deref().unwrap_or("sha256")),
            size,
            location,
            relations: self.relations,
        })
    }
}

/// Convert an `<rpm:entry>` into a relation
///
/// rpmlib() markers, file paths and rich (boolean) dependencies are not
/// modelled and are skipped.
fn relation_from_entry(e: &BytesStart, kind: RelationKind) -> Result<Option<Relation>> {
    let Some(name) = attribute(e, b"name") else {
        return Ok(None);
    };
    if name.starts_with("rpmlib(") || name.starts_with('/') || name.starts_with('(') {
        return Ok(None);
    }

    let constraint = match (attribute(e, b"flags"), attribute(e, b"ver")) {
        (Some(flags), Some(ver)) => {
            let epoch = parse_epoch(attribute(e, b"epoch").as_deref())?;
            let rel = attribute(e, b"rel");
            let bound = RpmVersion::from_parts(epoch, &ver, rel.as_deref());
            Some(VersionConstraint::from_rpm_flags(&flags, bound)?.to_string())
        }
        _ => None,
    };

    Ok(Some(Relation {
        name,
        constraint,
        kind,
    }))
}

fn parse_epoch(epoch: Option<&str>) -> Result<u64> {
    match epoch {
        None | Some("") => Ok(0),
        Some(e) => e
            .parse()
            .map_err(|err| Error::ParseError(format!("Invalid epoch '{}': {}", e, err))),
    }
}

fn attribute(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}
