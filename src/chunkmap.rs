//! Chunk metadata and the chunk-map collaborator boundary.
//!
//! The durability engine never owns the live chunk map; it snapshots it into
//! checkpoints and drives it during replay through the [`ChunkMap`] trait.
//! [`InMemoryChunkMap`] is a complete implementation for tests and for
//! servers that keep the whole map resident.

use std::collections::HashMap;

/// File identifier namespace.
pub type FileId = i64;
/// Chunk identifier namespace.
pub type ChunkId = i64;
/// Per-chunk version, monotonic, used for staleness detection.
pub type ChunkVersion = i64;

/// Size of the region covered by one block checksum.
pub const CHECKSUM_BLOCK_SIZE: u64 = 64 * 1024;

/// Metadata for a single chunk.
///
/// Serialized checkpoint form is one whitespace-delimited line:
/// `<fileId> <chunkId> <chunkSize> <chunkVersion> <checksumCount> <checksum>*`.
/// Invariant: the count field always equals `block_checksums.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// Owning file.
    pub file_id: FileId,
    /// Chunk identifier.
    pub chunk_id: ChunkId,
    /// Current chunk size in bytes.
    pub chunk_size: u64,
    /// Current chunk version.
    pub chunk_version: ChunkVersion,
    /// One checksum per [`CHECKSUM_BLOCK_SIZE`] block.
    pub block_checksums: Vec<u32>,
}

impl ChunkMetadata {
    /// Encode this record as one checkpoint line (no trailing newline).
    pub fn encode_line(&self) -> String {
        use std::fmt::Write as _;
        let mut line = format!(
            "{} {} {} {} {}",
            self.file_id,
            self.chunk_id,
            self.chunk_size,
            self.chunk_version,
            self.block_checksums.len()
        );
        for checksum in &self.block_checksums {
            let _ = write!(line, " {checksum}");
        }
        line
    }

    /// Parse one checkpoint line.
    ///
    /// Returns `None` for empty or malformed lines; checkpoint loading treats
    /// the first such line as a clean trailing boundary, not an error.
    pub fn decode_line(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let file_id = tokens.next()?.parse::<FileId>().ok()?;
        let chunk_id = tokens.next()?.parse::<ChunkId>().ok()?;
        let chunk_size = tokens.next()?.parse::<u64>().ok()?;
        let chunk_version = tokens.next()?.parse::<ChunkVersion>().ok()?;
        let count = tokens.next()?.parse::<usize>().ok()?;
        let mut block_checksums = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            block_checksums.push(tokens.next()?.parse::<u32>().ok()?);
        }
        Some(Self {
            file_id,
            chunk_id,
            chunk_size,
            chunk_version,
            block_checksums,
        })
    }
}

/// Encode a full chunk-map snapshot as checkpoint body lines.
///
/// Determinism: entries are sorted by chunk id so identical maps produce
/// byte-identical snapshots.
pub fn encode_snapshot<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = &'a ChunkMetadata>,
{
    let mut sorted: Vec<&ChunkMetadata> = entries.into_iter().collect();
    sorted.sort_by_key(|m| m.chunk_id);
    let mut out = String::new();
    for meta in sorted {
        out.push_str(&meta.encode_line());
        out.push('\n');
    }
    out
}

/// Mutation interface the durability engine drives.
///
/// `add_mapping` is used while loading a checkpoint; the `replay_*` operations
/// reapply logged mutations, one per opcode. Implementations are mutated only
/// single-threaded during recovery.
pub trait ChunkMap {
    /// Register a chunk loaded from a checkpoint.
    fn add_mapping(&mut self, meta: ChunkMetadata);
    /// Reapply a chunk allocation.
    fn replay_alloc_chunk(&mut self, file_id: FileId, chunk_id: ChunkId, version: ChunkVersion);
    /// Reapply a chunk deletion.
    fn replay_delete_chunk(&mut self, chunk_id: ChunkId);
    /// Reapply the metadata effect of a completed write.
    fn replay_write_done(&mut self, chunk_id: ChunkId, size: u64, offset: u64, checksums: Vec<u32>);
    /// Reapply a truncation's size change.
    fn replay_truncate_done(&mut self, chunk_id: ChunkId, size: u64);
    /// Reapply a version bump.
    fn replay_change_chunk_vers(
        &mut self,
        file_id: FileId,
        chunk_id: ChunkId,
        version: ChunkVersion,
    );
}

/// Resident chunk map keyed by chunk id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChunkMap {
    chunks: HashMap<ChunkId, ChunkMetadata>,
}

impl InMemoryChunkMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the map holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Look up a chunk.
    pub fn get(&self, chunk_id: ChunkId) -> Option<&ChunkMetadata> {
        self.chunks.get(&chunk_id)
    }

    /// Iterate over live chunk metadata (unordered).
    pub fn iter(&self) -> impl Iterator<Item = &ChunkMetadata> {
        self.chunks.values()
    }

    /// Encode the current map as a checkpoint snapshot body.
    pub fn snapshot(&self) -> String {
        encode_snapshot(self.chunks.values())
    }
}

impl ChunkMap for InMemoryChunkMap {
    fn add_mapping(&mut self, meta: ChunkMetadata) {
        self.chunks.insert(meta.chunk_id, meta);
    }

    fn replay_alloc_chunk(&mut self, file_id: FileId, chunk_id: ChunkId, version: ChunkVersion) {
        self.chunks.insert(
            chunk_id,
            ChunkMetadata {
                file_id,
                chunk_id,
                chunk_size: 0,
                chunk_version: version,
                block_checksums: Vec::new(),
            },
        );
    }

    fn replay_delete_chunk(&mut self, chunk_id: ChunkId) {
        self.chunks.remove(&chunk_id);
    }

    fn replay_write_done(
        &mut self,
        chunk_id: ChunkId,
        size: u64,
        offset: u64,
        checksums: Vec<u32>,
    ) {
        let Some(meta) = self.chunks.get_mut(&chunk_id) else {
            return;
        };
        meta.chunk_size = size;
        let first_block = (offset / CHECKSUM_BLOCK_SIZE) as usize;
        if meta.block_checksums.len() < first_block + checksums.len() {
            meta.block_checksums.resize(first_block + checksums.len(), 0);
        }
        meta.block_checksums[first_block..first_block + checksums.len()]
            .copy_from_slice(&checksums);
    }

    fn replay_truncate_done(&mut self, chunk_id: ChunkId, size: u64) {
        let Some(meta) = self.chunks.get_mut(&chunk_id) else {
            return;
        };
        meta.chunk_size = size;
        let blocks = size.div_ceil(CHECKSUM_BLOCK_SIZE) as usize;
        meta.block_checksums.truncate(blocks);
    }

    fn replay_change_chunk_vers(
        &mut self,
        file_id: FileId,
        chunk_id: ChunkId,
        version: ChunkVersion,
    ) {
        let Some(meta) = self.chunks.get_mut(&chunk_id) else {
            return;
        };
        meta.file_id = file_id;
        meta.chunk_version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(chunk_id: ChunkId) -> ChunkMetadata {
        ChunkMetadata {
            file_id: 10,
            chunk_id,
            chunk_size: 131072,
            chunk_version: 3,
            block_checksums: vec![0xAAAA, 0xBBBB],
        }
    }

    #[test]
    fn metadata_line_roundtrip() {
        let m = meta(100);
        let line = m.encode_line();
        assert_eq!(line, "10 100 131072 3 2 43690 48059");
        assert_eq!(ChunkMetadata::decode_line(&line), Some(m));
    }

    #[test]
    fn metadata_line_rejects_malformed() {
        assert_eq!(ChunkMetadata::decode_line(""), None);
        assert_eq!(ChunkMetadata::decode_line("1 2 3"), None);
        // Count promises more checksums than the line carries.
        assert_eq!(ChunkMetadata::decode_line("1 2 3 4 2 5"), None);
        assert_eq!(ChunkMetadata::decode_line("a b c d e"), None);
    }

    #[test]
    fn snapshot_is_sorted_by_chunk_id() {
        let mut map = InMemoryChunkMap::new();
        map.add_mapping(meta(30));
        map.add_mapping(meta(10));
        map.add_mapping(meta(20));

        let body = map.snapshot();
        let ids: Vec<i64> = body
            .lines()
            .map(|l| ChunkMetadata::decode_line(l).unwrap().chunk_id)
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn write_done_extends_and_overwrites_checksums() {
        let mut map = InMemoryChunkMap::new();
        map.replay_alloc_chunk(1, 100, 1);
        map.replay_write_done(100, 65536, 0, vec![7]);
        assert_eq!(map.get(100).unwrap().chunk_size, 65536);
        assert_eq!(map.get(100).unwrap().block_checksums, vec![7]);

        // Write into the second block region.
        map.replay_write_done(100, 131072, CHECKSUM_BLOCK_SIZE, vec![9]);
        assert_eq!(map.get(100).unwrap().block_checksums, vec![7, 9]);
    }

    #[test]
    fn truncate_done_drops_trailing_checksums() {
        let mut map = InMemoryChunkMap::new();
        map.replay_alloc_chunk(1, 100, 1);
        map.replay_write_done(100, 2 * CHECKSUM_BLOCK_SIZE, 0, vec![7, 9]);
        map.replay_truncate_done(100, CHECKSUM_BLOCK_SIZE);
        assert_eq!(map.get(100).unwrap().chunk_size, CHECKSUM_BLOCK_SIZE);
        assert_eq!(map.get(100).unwrap().block_checksums, vec![7]);
    }

    #[test]
    fn replay_mutations_for_unknown_chunk_are_ignored() {
        let mut map = InMemoryChunkMap::new();
        map.replay_write_done(5, 100, 0, vec![1]);
        map.replay_truncate_done(5, 10);
        map.replay_change_chunk_vers(1, 5, 2);
        map.replay_delete_chunk(5);
        assert!(map.is_empty());
    }

    #[test]
    fn change_version_updates_owner_and_version() {
        let mut map = InMemoryChunkMap::new();
        map.replay_alloc_chunk(1, 100, 1);
        map.replay_change_chunk_vers(2, 100, 5);
        let m = map.get(100).unwrap();
        assert_eq!(m.file_id, 2);
        assert_eq!(m.chunk_version, 5);
    }
}
