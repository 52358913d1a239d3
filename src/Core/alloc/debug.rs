use super::*;

// Debug proxy implementation that calls the standalone debug function
impl fmt::Debug for ChunkIdAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_chunk_id_allocator(self, f)
    }
}
