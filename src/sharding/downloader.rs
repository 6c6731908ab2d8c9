use super::common::*;

///
/// Reassembles an artifact from its chunks, which must be fed in index order.
/// `finish` checks the result against the size and digest recorded at upload.
///
pub struct ArtifactDownloader {
    metadata: ArtifactMetadata,
    content: Vec<u8>,
    chunk_index: usize,
}

impl ArtifactDownloader {
    pub fn new(metadata: ArtifactMetadata) -> Self {
        ArtifactDownloader {
            content: Vec::with_capacity(metadata.size),
            metadata,
            chunk_index: 0,
        }
    }

    pub fn store_next_chunk(&mut self, data: Vec<u8>) -> Result<(), ShardingError> {
        if self.chunk_index >= self.metadata.chunk_count {
            return Err(ShardingError::UnwantedChunk);
        }
        self.content.extend_from_slice(&data);
        self.chunk_index += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<u8>, ShardingError> {
        if self.chunk_index != self.metadata.chunk_count {
            return Err(ShardingError::ChunkCountMismatch {
                expected: self.metadata.chunk_count,
                received: self.chunk_index,
            });
        }
        if self.content.len() != self.metadata.size {
            return Err(ShardingError::SizeMismatch {
                expected: self.metadata.size,
                actual: self.content.len(),
            });
        }
        if content_digest(&self.content) != self.metadata.digest {
            return Err(ShardingError::DigestMismatch);
        }
        Ok(self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharding::uploader::ArtifactUploader;

    fn split(content: &[u8], chunk_size: usize) -> (Vec<Chunk>, ArtifactMetadata) {
        let mut uploader = ArtifactUploader::new("artifact", content, chunk_size).unwrap();
        let chunks: Vec<Chunk> = uploader.by_ref().collect();
        (chunks, uploader.get_metadata().unwrap())
    }

    #[test]
    fn test_reassembles_in_order() {
        let content = b"The quick brown fox jumps over the lazy dog";
        for chunk_size in [1, 3, 10, content.len(), content.len() + 5] {
            let (chunks, metadata) = split(content, chunk_size);
            let mut downloader = ArtifactDownloader::new(metadata);
            for chunk in chunks {
                downloader.store_next_chunk(chunk.data).unwrap();
            }
            assert_eq!(downloader.finish().unwrap(), content.to_vec());
        }
    }

    #[test]
    fn test_store_unwanted_chunk() {
        let (chunks, metadata) = split(b"abcdef", 3);
        let mut downloader = ArtifactDownloader::new(metadata);
        for chunk in chunks.iter().cloned() {
            downloader.store_next_chunk(chunk.data).unwrap();
        }
        let result = downloader.store_next_chunk(chunks[0].data.clone());
        assert!(
            matches!(result, Err(ShardingError::UnwantedChunk)),
            "Expected ShardingError::UnwantedChunk, got: {:?}",
            result
        );
    }

    #[test]
    fn test_missing_chunk_is_detected() {
        let (chunks, metadata) = split(b"abcdef", 3);
        let mut downloader = ArtifactDownloader::new(metadata);
        downloader.store_next_chunk(chunks[0].data.clone()).unwrap();
        assert_eq!(
            downloader.finish(),
            Err(ShardingError::ChunkCountMismatch {
                expected: 2,
                received: 1
            })
        );
    }

    #[test]
    fn test_truncated_chunk_is_a_size_mismatch() {
        let (_, metadata) = split(b"abcdef", 3);
        let mut downloader = ArtifactDownloader::new(metadata);
        downloader.store_next_chunk(b"abc".to_vec()).unwrap();
        downloader.store_next_chunk(b"de".to_vec()).unwrap();
        assert_eq!(
            downloader.finish(),
            Err(ShardingError::SizeMismatch {
                expected: 6,
                actual: 5
            })
        );
    }

    #[test]
    fn test_corrupted_chunk_is_a_digest_mismatch() {
        let (_, metadata) = split(b"abcdef", 3);
        let mut downloader = ArtifactDownloader::new(metadata);
        downloader.store_next_chunk(b"abc".to_vec()).unwrap();
        downloader.store_next_chunk(b"deX".to_vec()).unwrap();
        assert_eq!(downloader.finish(), Err(ShardingError::DigestMismatch));
    }
}
