use std::fmt;

/// パースエラー
///
/// パーサーが返す 5 種類の結果のうち、致命的な 2 種類を表す。
/// データ不足 (`Progress::NeedMoreData`) はエラーではない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// プロトコルレベルで不正なバイト列
    Invalid(&'static str),
    /// 設定された上限を超えた
    DataTooBig { size: usize, limit: usize },
}

impl ParseError {
    /// 不正データかどうか
    pub fn is_invalid(&self) -> bool {
        matches!(self, ParseError::Invalid(_))
    }

    /// 上限超過かどうか
    pub fn is_data_too_big(&self) -> bool {
        matches!(self, ParseError::DataTooBig { .. })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Invalid(reason) => write!(f, "invalid data: {}", reason),
            ParseError::DataTooBig { size, limit } => {
                write!(f, "data too big: {} > {}", size, limit)
            }
        }
    }
}

impl std::error::Error for ParseError {}
