use crate::crypto::Encryptor;
use crate::types::{BlobKind, ObjectID, PackID};
use crate::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{Read, Write};

/// Location and size of one sealed blob inside a pack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedBlob {
    pub id: ObjectID,
    pub kind: BlobKind,
    pub offset: u64,
    pub length: u32,
    pub raw_length: u32,
}

/// Accumulates sealed blobs into a single pack.
///
/// Each blob is compressed with zlib and sealed with the blob kind as associated
/// data, so an index entry that misstates the kind cannot be decrypted.
#[derive(Debug, Default)]
pub struct PackWriter {
    data: Vec<u8>,
    blobs: Vec<PackedBlob>,
    seen: HashSet<ObjectID>,
}

#[derive(Debug, Clone)]
pub struct FinishedPack {
    pub id: PackID,
    pub data: Bytes,
    pub blobs: Vec<PackedBlob>,
}

impl PackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `plaintext` and returns its id. A blob already in this pack is not stored twice.
    pub fn add_blob(&mut self, kind: BlobKind, plaintext: &[u8], encryptor: &Encryptor) -> Result<ObjectID> {
        let id = ObjectID::from_data(plaintext);
        if !self.seen.insert(id) {
            return Ok(id);
        }

        let raw_length = blob_length(plaintext.len())?;
        let compressed = compress_data(plaintext)?;
        let sealed = encryptor.encrypt_with_aad(&compressed, kind.tag())?;
        let length = blob_length(sealed.len())?;

        self.blobs.push(PackedBlob {
            id,
            kind,
            offset: self.data.len() as u64,
            length,
            raw_length,
        });
        self.data.extend_from_slice(&sealed);

        Ok(id)
    }

    pub fn contains(&self, id: &ObjectID) -> bool {
        self.seen.contains(id)
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn finish(self) -> FinishedPack {
        FinishedPack {
            id: ObjectID::from_data(&self.data),
            data: Bytes::from(self.data),
            blobs: self.blobs,
        }
    }
}

/// Opens a sealed blob read back from a pack and checks it against what the index
/// recorded. Every mismatch is reported as an integrity violation.
pub fn open_blob(
    id: ObjectID,
    kind: BlobKind,
    expected_length: u32,
    raw_length: u32,
    sealed: &[u8],
    encryptor: &Encryptor,
) -> Result<Bytes> {
    if sealed.len() != expected_length as usize {
        return Err(Error::integrity(
            id,
            format!("expected {} sealed bytes, got {}", expected_length, sealed.len()),
        ));
    }

    let compressed = encryptor
        .decrypt_with_aad(sealed, kind.tag())
        .map_err(|_| Error::integrity(id, format!("{} blob failed authentication", kind)))?;

    let plaintext = decompress_data(&compressed, raw_length)
        .map_err(|e| Error::integrity(id, format!("decompression failed: {}", e)))?;

    if plaintext.len() != raw_length as usize {
        return Err(Error::integrity(
            id,
            format!("expected {} plaintext bytes, got {}", raw_length, plaintext.len()),
        ));
    }

    if ObjectID::from_data(&plaintext) != id {
        return Err(Error::integrity(id, "content hash mismatch"));
    }

    Ok(Bytes::from(plaintext))
}

/// Blob sizes are recorded as `u32` in the index.
fn blob_length(size: usize) -> Result<u32> {
    u32::try_from(size).map_err(|_| Error::BlobTooLarge { size })
}

fn compress_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflates at most one byte more than `raw_length`, enough to notice an overlong blob.
fn decompress_data(data: &[u8], raw_length: u32) -> std::io::Result<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data).take(raw_length as u64 + 1);
    let mut result = Vec::new();
    decoder.read_to_end(&mut result)?;
    Ok(result)
}
