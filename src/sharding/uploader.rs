use super::common::*;

///
/// Splits an artifact's content into ordered chunks of `chunk_size` bytes.
///
/// The splitter is an iterator; once it is exhausted `get_metadata` describes the
/// artifact that was produced.
///
pub struct ArtifactUploader<'a> {
    name: String,
    content: &'a [u8],
    chunk_size: usize,
    next_index: usize,
    chunk_ids: Vec<String>,
}

impl<'a> ArtifactUploader<'a> {
    pub fn new(name: &str, content: &'a [u8], chunk_size: usize) -> Result<Self, ShardingError> {
        if chunk_size == 0 {
            return Err(ShardingError::InvalidChunkSize);
        }
        if content.is_empty() {
            return Err(ShardingError::EmptyContent);
        }
        Ok(ArtifactUploader {
            name: name.to_string(),
            content,
            chunk_size,
            next_index: 0,
            chunk_ids: Vec::new(),
        })
    }

    pub fn content_len(&self) -> usize {
        self.content.len()
    }

    /// Number of chunks the whole content splits into.
    pub fn chunk_count(&self) -> usize {
        self.content.len().div_ceil(self.chunk_size)
    }

    pub fn get_next_chunk(&mut self) -> Option<Chunk> {
        let start = self.next_index * self.chunk_size;
        if start >= self.content.len() {
            return None;
        }
        let end = (start + self.chunk_size).min(self.content.len());

        let chunk = Chunk {
            id: chunk_id(&self.name, self.next_index),
            index: self.next_index,
            data: self.content[start..end].to_vec(),
        };
        self.chunk_ids.push(chunk.id.clone());
        self.next_index += 1;
        Some(chunk)
    }

    pub fn get_metadata(self) -> Result<ArtifactMetadata, ShardingError> {
        if self.chunk_ids.len() != self.chunk_count() {
            return Err(ShardingError::MetadataNotFilled);
        }
        Ok(ArtifactMetadata {
            chunk_count: self.chunk_ids.len(),
            chunk_ids: self.chunk_ids,
            size: self.content.len(),
            digest: content_digest(self.content),
        })
    }
}

impl Iterator for ArtifactUploader<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        self.get_next_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uploader_rejects_zero_chunk_size() {
        let result = ArtifactUploader::new("a", b"content", 0);
        assert!(matches!(result, Err(ShardingError::InvalidChunkSize)));
    }

    #[test]
    fn test_uploader_rejects_empty_content() {
        let result = ArtifactUploader::new("a", b"", 10);
        assert!(matches!(result, Err(ShardingError::EmptyContent)));
    }

    #[test]
    fn test_last_chunk_is_shorter() {
        let content = b"0123456789abcdefghijXYZ";
        let uploader = ArtifactUploader::new("doc", content, 10).unwrap();
        assert_eq!(uploader.chunk_count(), 3);

        let chunks: Vec<Chunk> = uploader.collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, b"0123456789");
        assert_eq!(chunks[1].data, b"abcdefghij");
        assert_eq!(chunks[2].data, b"XYZ");
        assert_eq!(chunks[2].id, "doc_chunk_2");
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_chunk() {
        let content = [7u8; 200];
        let chunks: Vec<Chunk> = ArtifactUploader::new("big", &content, 10)
            .unwrap()
            .collect();
        assert_eq!(chunks.len(), 20);
        assert!(chunks.iter().all(|c| c.data.len() == 10));
    }

    #[test]
    fn test_get_metadata_after_split() {
        let content = b"hello world";
        let mut uploader = ArtifactUploader::new("greeting", content, 4).unwrap();
        while uploader.get_next_chunk().is_some() {}

        let metadata = uploader.get_metadata().unwrap();
        assert_eq!(metadata.chunk_count, 3);
        assert_eq!(
            metadata.chunk_ids,
            vec!["greeting_chunk_0", "greeting_chunk_1", "greeting_chunk_2"]
        );
        assert_eq!(metadata.size, content.len());
        assert_eq!(metadata.digest, content_digest(content));
    }

    #[test]
    fn test_get_metadata_fails_when_not_split_completely() {
        let mut uploader = ArtifactUploader::new("greeting", b"hello world", 4).unwrap();
        uploader.get_next_chunk();
        let metadata = uploader.get_metadata();
        assert!(
            matches!(metadata, Err(ShardingError::MetadataNotFilled)),
            "Expected get_metadata to fail cause content was not split completely"
        );
    }
}
