use ragloop_core::{Chunk, ChunkMetadata};
use ragloop_error::{RagError, Result};

/// 文本分块器：按词切分为重叠的固定大小窗口
///
/// 窗口从 0 开始，每次前进 `chunk_size - overlap` 个词，
/// 相邻窗口共享 `overlap` 个词，末尾窗口允许不足 `chunk_size`。
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
        }
    }
}

impl TextChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// 切分文本，返回带位置元数据的有序块序列
    ///
    /// 空文本或纯空白返回空序列，不算错误。`overlap >= chunk_size`
    /// 会让步长归零，返回 `Chunking` 错误而不是悄悄修正。
    pub fn chunk(&self, text: &str, source: &str) -> Result<Vec<Chunk>> {
        if self.chunk_size == 0 || self.overlap >= self.chunk_size {
            return Err(RagError::Chunking {
                reason: format!(
                    "stride must be positive: chunk_size={} overlap={}",
                    self.chunk_size, self.overlap
                ),
            });
        }
        let stride = self.chunk_size - self.overlap;

        let words: Vec<&str> = text.split_whitespace().collect();
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + self.chunk_size).min(words.len());
            let chunk_text = words[start..end].join(" ");
            let char_count = chunk_text.chars().count();
            chunks.push(Chunk {
                text: chunk_text,
                metadata: ChunkMetadata {
                    source: source.to_string(),
                    chunk_index: start / stride,
                    char_count,
                },
            });
            start += stride;
        }

        Ok(chunks)
    }
}
