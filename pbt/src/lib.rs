//! PBT テスト共通ユーティリティ

use proptest::prelude::*;

// ========================================
// ヘッダー生成
// ========================================

/// 拡張ヘッダー名 (フレーミングに関わる名前とは衝突しない)
pub fn extension_header_name() -> impl Strategy<Value = String> {
    "[A-Za-z0-9-]{1,16}".prop_map(|s| format!("X-{}", s))
}

/// 前後に空白を含まない印字可能 ASCII のヘッダー値
pub fn header_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[!-~]{1,32}".prop_map(|s| s),
        ("[!-~]{1,8}", "[!-~]{1,8}").prop_map(|(a, b)| format!("{} {}", a, b)),
    ]
}

pub fn extension_headers(max: usize) -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((extension_header_name(), header_value()), 0..=max)
}

/// ボディを持つレスポンスのステータスコード
pub fn status_with_body() -> impl Strategy<Value = u16> {
    prop_oneof![200u16..=203, 206u16..=226, 400u16..=451, 500u16..=511]
}

/// 入力を分割する位置 (昇順、重複なし)
pub fn split_points(len: usize, max: usize) -> impl Strategy<Value = Vec<usize>> {
    proptest::collection::btree_set(0..=len, 0..=max).prop_map(|set| set.into_iter().collect())
}

/// `points` の位置で `data` を分割する
pub fn split_at_points<'a>(data: &'a [u8], points: &[usize]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for &point in points {
        let point = point.min(data.len());
        if point > start {
            pieces.push(&data[start..point]);
            start = point;
        }
    }
    pieces.push(&data[start..]);
    pieces
}
