/// デフォルトの最大レスポンスヘッダーサイズ (ステータス行を含む)
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8190;

/// チャンクサイズの上限 (2 GiB - 1)
pub const MAX_CHUNK_SIZE: u64 = i32::MAX as u64;

/// デコーダーの制限設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderLimits {
    /// ステータス行とヘッダー行の合計バイト数の上限 (デフォルト: 8190)
    ///
    /// chunked のトレーラーにも同じ上限を適用する。
    pub max_header_bytes: usize,
    /// 1 チャンクの最大サイズ (デフォルト: 2 GiB - 1)
    ///
    /// これを超えるチャンクサイズは切り詰めずに不正データとして扱う。
    pub max_chunk_size: u64,
}

impl Default for DecoderLimits {
    fn default() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }
}

impl DecoderLimits {
    /// 制限なしの設定を作成
    ///
    /// チャンクサイズの上限だけは外さない。
    pub fn unlimited() -> Self {
        Self {
            max_header_bytes: usize::MAX,
            max_chunk_size: MAX_CHUNK_SIZE,
        }
    }

    /// ヘッダーサイズ上限を設定 (ビルダーパターン)
    pub fn max_header_bytes(mut self, limit: usize) -> Self {
        self.max_header_bytes = limit;
        self
    }
}
