//! MPEG-4 tag writing using lofty
//!
//! Canonical tags become iTunes-style `ilst` atoms. The track number entry is
//! already in `trkn` layout and is stored as-is.

use std::borrow::Cow;
use std::path::Path;

use lofty::config::WriteOptions;
use lofty::mp4::{Atom, AtomData, AtomIdent, Ilst};
use lofty::picture::{MimeType, Picture, PictureType};
use lofty::tag::TagExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::metadata::{TagEntry, TagKind, TagValue};

/// Implicit data type, used by `trkn`
const DATA_TYPE_IMPLICIT: u32 = 0;

/// Atom identifier for a tag kind
fn atom_ident(kind: TagKind) -> AtomIdent<'static> {
    match kind {
        TagKind::Album => AtomIdent::Fourcc(*b"\xa9alb"),
        TagKind::Artist => AtomIdent::Fourcc(*b"\xa9ART"),
        TagKind::Comment => AtomIdent::Fourcc(*b"\xa9cmt"),
        TagKind::Composer => AtomIdent::Fourcc(*b"\xa9wrt"),
        TagKind::Copyright => AtomIdent::Fourcc(*b"cprt"),
        TagKind::Genre => AtomIdent::Fourcc(*b"\xa9gen"),
        TagKind::Lyricist => AtomIdent::Fourcc(*b"\xa9lyr"),
        TagKind::ReleaseDate => AtomIdent::Fourcc(*b"\xa9day"),
        TagKind::Title => AtomIdent::Fourcc(*b"\xa9nam"),
        TagKind::TrackNumber => AtomIdent::Fourcc(*b"trkn"),
        TagKind::CoverArt => AtomIdent::Fourcc(*b"covr"),
        TagKind::Isrc => AtomIdent::Freeform {
            mean: Cow::Borrowed("com.apple.iTunes"),
            name: Cow::Borrowed("ISRC"),
        },
    }
}

/// Picture for a `covr` atom.
///
/// Formats the MP4 writer cannot label are stored with an implicit type, so
/// one odd image never costs the file its other tags.
fn cover_picture(data: &[u8]) -> Picture {
    match Picture::from_reader(&mut &data[..]) {
        Ok(picture) if matches!(
            picture.mime_type(),
            Some(MimeType::Jpeg | MimeType::Png | MimeType::Bmp | MimeType::Gif)
        ) =>
        {
            picture
        }
        Ok(picture) => {
            debug!("Artwork type {:?} not storable in MP4, storing raw", picture.mime_type());
            Picture::new_unchecked(PictureType::Other, None, None, data.to_vec())
        }
        Err(e) => {
            debug!("Artwork format not recognized ({}), storing raw", e);
            Picture::new_unchecked(PictureType::Other, None, None, data.to_vec())
        }
    }
}

fn atom_data(kind: TagKind, value: &TagValue) -> AtomData {
    match (kind, value) {
        (TagKind::CoverArt, TagValue::Binary(data)) => AtomData::Picture(cover_picture(data)),
        (_, TagValue::Binary(data)) => AtomData::Unknown {
            code: DATA_TYPE_IMPLICIT,
            data: data.clone(),
        },
        (_, TagValue::Text(text)) => AtomData::UTF8(text.clone()),
        (_, TagValue::Date(date)) => AtomData::UTF8(date.format("%Y-%m-%d").to_string()),
    }
}

/// Build the `ilst` for a tag set
pub fn build_ilst(tags: &[TagEntry]) -> Ilst {
    let mut ilst = Ilst::default();
    for entry in tags {
        ilst.insert(Atom::new(atom_ident(entry.kind), atom_data(entry.kind, &entry.value)));
    }
    ilst
}

/// Write `tags` into an existing MPEG-4 file
pub fn write_tags(path: &Path, tags: &[TagEntry]) -> Result<()> {
    if tags.is_empty() {
        return Ok(());
    }

    let ilst = build_ilst(tags);
    ilst.save_to_path(path, WriteOptions::default()).map_err(|e| {
        warn!("Failed to write tags to {}: {}", path.display(), e);
        Error::Write(format!("tagging {}: {}", path.display(), e))
    })?;

    debug!(count = tags.len(), "Wrote tags to {}", path.display());
    Ok(())
}
