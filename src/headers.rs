//! ヘッダー集合

/// 大文字小文字を区別しないヘッダー集合
///
/// 同じ名前を繰り返し追加すると値は `,` で結合される。
/// 検索は順序に依存しないが、シリアライズ時は最初に追加された順に並ぶ。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    /// 空のヘッダー集合を作成
    pub fn new() -> Self {
        Self::default()
    }

    /// ヘッダーを追加 (同名があれば `,` で結合)
    pub fn append(&mut self, name: &str, value: &str) {
        if let Some((_, existing)) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            existing.push(',');
            existing.push_str(value);
        } else {
            self.entries.push((name.to_string(), value.to_string()));
        }
    }

    /// ヘッダーを設定 (同名があれば置き換え)
    pub fn set(&mut self, name: &str, value: &str) {
        if let Some((_, existing)) = self
            .entries
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            *existing = value.to_string();
        } else {
            self.entries.push((name.to_string(), value.to_string()));
        }
    }

    /// ヘッダーを削除して値を返す
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    /// ヘッダーを取得 (大文字小文字を区別しない)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// ヘッダーが存在するか確認
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// 値をカンマ区切りのトークンとして列挙
    pub fn tokens<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.get(name)
            .into_iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// 指定トークンが含まれるか (大文字小文字を区別しない)
    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.tokens(name).any(|t| t.eq_ignore_ascii_case(token))
    }

    /// 追加順にイテレート
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// ヘッダー数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 空かどうか
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// すべて削除
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<'a> IntoIterator for &'a HeaderSet {
    type Item = (&'a str, &'a str);
    type IntoIter = std::iter::Map<
        std::slice::Iter<'a, (String, String)>,
        fn(&'a (String, String)) -> (&'a str, &'a str),
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn pair(entry: &(String, String)) -> (&str, &str) {
            (entry.0.as_str(), entry.1.as_str())
        }
        self.entries.iter().map(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut headers = HeaderSet::new();
        headers.append("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        assert!(headers.get("Content-Length").is_none());
    }

    #[test]
    fn test_repeated_names_are_joined() {
        let mut headers = HeaderSet::new();
        headers.append("Vary", "Accept");
        headers.append("Host", "example.com");
        headers.append("vary", "Accept-Encoding");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("Vary"), Some("Accept,Accept-Encoding"));

        // 追加順を保持
        let names: Vec<&str> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["Vary", "Host"]);
    }

    #[test]
    fn test_tokens_split_on_comma() {
        let mut headers = HeaderSet::new();
        headers.append("Connection", "keep-alive, Upgrade");
        headers.append("Connection", "Close");
        assert!(headers.has_token("connection", "close"));
        assert!(headers.has_token("connection", "upgrade"));
        assert_eq!(headers.tokens("Connection").count(), 3);
    }

    #[test]
    fn test_set_and_remove() {
        let mut headers = HeaderSet::new();
        headers.append("Accept", "a");
        headers.set("accept", "b");
        assert_eq!(headers.get("Accept"), Some("b"));
        assert_eq!(headers.remove("ACCEPT"), Some("b".to_string()));
        assert!(headers.is_empty());
    }
}
