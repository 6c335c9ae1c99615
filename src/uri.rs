//! URI パースと相対参照の解決 (RFC 3986 のうちクライアントに必要な部分)
//!
//! ```rust
//! use h11wire::uri::Uri;
//!
//! let uri = Uri::parse("https://example.com:8443/a/b?x=1#frag").unwrap();
//! assert_eq!(uri.scheme(), Some("https"));
//! assert_eq!(uri.host(), Some("example.com"));
//! assert_eq!(uri.port_or_default(), Some(8443));
//! assert_eq!(uri.origin_form(), "/a/b?x=1");
//!
//! let next = uri.resolve("../c").unwrap();
//! assert_eq!(next.to_string(), "https://example.com:8443/c");
//! ```

use core::fmt;

/// URI パースエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UriError {
    /// 空の URI
    Empty,
    /// 不正なスキーム
    InvalidScheme,
    /// 不正なホスト
    InvalidHost,
    /// 不正なポート番号
    InvalidPort,
    /// 不正な文字
    InvalidCharacter(char),
}

impl fmt::Display for UriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UriError::Empty => write!(f, "empty URI"),
            UriError::InvalidScheme => write!(f, "invalid scheme"),
            UriError::InvalidHost => write!(f, "invalid host"),
            UriError::InvalidPort => write!(f, "invalid port"),
            UriError::InvalidCharacter(c) => write!(f, "invalid character: {:?}", c),
        }
    }
}

impl std::error::Error for UriError {}

/// パース済み URI (絶対 URI もしくは相対参照)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    /// 小文字化したスキーム
    scheme: Option<String>,
    /// userinfo を除いた小文字のホスト (IPv6 は角括弧を含む)
    host: Option<String>,
    port: Option<u16>,
    path: String,
    query: Option<String>,
    fragment: Option<String>,
}

impl Uri {
    /// URI 文字列をパース
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(UriError::Empty);
        }
        if let Some(c) = input.chars().find(|c| c.is_ascii_control() || *c == ' ') {
            return Err(UriError::InvalidCharacter(c));
        }

        let (rest, fragment) = match input.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (input, None),
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query.to_string())),
            None => (rest, None),
        };

        let (scheme, rest) = match split_scheme(rest)? {
            Some((scheme, rest)) => (Some(scheme.to_ascii_lowercase()), rest),
            None => (None, rest),
        };

        let (host, port, path) = match rest.strip_prefix("//") {
            Some(after) => {
                let end = after.find('/').unwrap_or(after.len());
                let (host, port) = parse_authority(&after[..end])?;
                (Some(host), port, after[end..].to_string())
            }
            None => (None, None, rest.to_string()),
        };

        Ok(Self {
            scheme,
            host,
            port,
            path,
            query,
            fragment,
        })
    }

    /// スキーム
    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    /// ホスト
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// 明示されたポート番号
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// ポート番号 (省略時はスキームのデフォルト)
    pub fn port_or_default(&self) -> Option<u16> {
        self.port.or(match self.scheme() {
            Some("http") => Some(80),
            Some("https") => Some(443),
            _ => None,
        })
    }

    /// パス
    pub fn path(&self) -> &str {
        &self.path
    }

    /// クエリ (`?` を含まない)
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// フラグメント (`#` を含まない)
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// 絶対 URI か
    pub fn is_absolute(&self) -> bool {
        self.scheme.is_some()
    }

    /// https か
    pub fn is_secure(&self) -> bool {
        self.scheme() == Some("https")
    }

    /// Host ヘッダーの値 (デフォルトポートは省略)
    pub fn host_header(&self) -> Option<String> {
        let host = self.host()?;
        Some(match self.port {
            Some(port) if Some(port) != default_port(self.scheme()) => {
                format!("{}:{}", host, port)
            }
            _ => host.to_string(),
        })
    }

    /// origin-form (path + query)
    ///
    /// HTTP リクエストの request-target として使用
    pub fn origin_form(&self) -> String {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        match &self.query {
            Some(query) => format!("{}?{}", path, query),
            None => path.to_string(),
        }
    }

    /// フラグメントを除いた absolute-form
    ///
    /// プロキシへのリクエストの request-target として使用
    pub fn absolute_form(&self) -> String {
        let mut uri = self.clone();
        uri.fragment = None;
        if uri.path.is_empty() {
            uri.path.push('/');
        }
        uri.to_string()
    }

    /// クエリパラメーターを追加
    ///
    /// 名前と値はパーセントエンコードされる。
    pub fn append_query_pair(&mut self, name: &str, value: &str) {
        let pair = format!("{}={}", percent_encode(name), percent_encode(value));
        match &mut self.query {
            Some(query) if !query.is_empty() => {
                query.push('&');
                query.push_str(&pair);
            }
            _ => self.query = Some(pair),
        }
    }

    /// この URI を基底として参照を解決 (RFC 3986 Section 5.2)
    pub fn resolve(&self, reference: &str) -> Result<Uri, UriError> {
        if reference.trim().is_empty() {
            let mut uri = self.clone();
            uri.fragment = None;
            return Ok(uri);
        }
        let reference = Uri::parse(reference)?;
        if reference.scheme.is_some() {
            return Ok(Uri {
                path: remove_dot_segments(&reference.path),
                ..reference
            });
        }
        if reference.host.is_some() {
            return Ok(Uri {
                scheme: self.scheme.clone(),
                path: remove_dot_segments(&reference.path),
                ..reference
            });
        }

        let (path, query) = if reference.path.is_empty() {
            (self.path.clone(), reference.query.or_else(|| self.query.clone()))
        } else if reference.path.starts_with('/') {
            (remove_dot_segments(&reference.path), reference.query)
        } else {
            let merged = if self.host.is_some() && self.path.is_empty() {
                format!("/{}", reference.path)
            } else {
                match self.path.rfind('/') {
                    Some(slash) => format!("{}{}", &self.path[..=slash], reference.path),
                    None => reference.path.clone(),
                }
            };
            (remove_dot_segments(&merged), reference.query)
        };

        Ok(Uri {
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            path,
            query,
            fragment: reference.fragment,
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scheme) = &self.scheme {
            write!(f, "{}:", scheme)?;
        }
        if let Some(host) = &self.host {
            write!(f, "//{}", host)?;
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        if let Some(fragment) = &self.fragment {
            write!(f, "#{}", fragment)?;
        }
        Ok(())
    }
}

fn default_port(scheme: Option<&str>) -> Option<u16> {
    match scheme {
        Some("http") => Some(80),
        Some("https") => Some(443),
        _ => None,
    }
}

/// `scheme:` を切り出す
fn split_scheme(input: &str) -> Result<Option<(&str, &str)>, UriError> {
    let Some(colon) = input.find(':') else {
        return Ok(None);
    };
    let scheme = &input[..colon];
    // `/` を含むなら `:` はパスの一部
    if scheme.contains('/') {
        return Ok(None);
    }
    let mut bytes = scheme.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() => {}
        _ => return Err(UriError::InvalidScheme),
    }
    if !bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.')) {
        return Err(UriError::InvalidScheme);
    }
    Ok(Some((scheme, &input[colon + 1..])))
}

/// authority を (ホスト, ポート) に分解
fn parse_authority(authority: &str) -> Result<(String, Option<u16>), UriError> {
    let host_port = match authority.rfind('@') {
        Some(at) => &authority[at + 1..],
        None => authority,
    };

    let (host, port) = if host_port.starts_with('[') {
        let close = host_port.find(']').ok_or(UriError::InvalidHost)?;
        let after = &host_port[close + 1..];
        let port = match after {
            "" => None,
            _ => Some(after.strip_prefix(':').ok_or(UriError::InvalidHost)?),
        };
        (&host_port[..=close], port)
    } else {
        match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (host_port, None),
        }
    };

    if host.is_empty() {
        return Err(UriError::InvalidHost);
    }
    let port = match port {
        None | Some("") => None,
        Some(port) => Some(port.parse::<u16>().map_err(|_| UriError::InvalidPort)?),
    };
    Ok((host.to_ascii_lowercase(), port))
}

/// `.` と `..` セグメントを除去 (RFC 3986 Section 5.2.4)
fn remove_dot_segments(path: &str) -> String {
    let mut output: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');
    let segments: Vec<&str> = path.split('/').skip(usize::from(absolute)).collect();
    let last = segments.len().saturating_sub(1);
    let mut trailing_slash = false;
    for (i, segment) in segments.iter().enumerate() {
        match *segment {
            "." => trailing_slash = i == last,
            ".." => {
                output.pop();
                trailing_slash = i == last;
            }
            s => {
                output.push(s);
                trailing_slash = false;
            }
        }
    }
    let mut result = String::with_capacity(path.len());
    if absolute {
        result.push('/');
    }
    result.push_str(&output.join("/"));
    if trailing_slash && !result.ends_with('/') {
        result.push('/');
    }
    result
}

/// unreserved 文字以外をパーセントエンコード (RFC 3986 Section 2.1)
///
/// ```rust
/// use h11wire::uri::percent_encode;
///
/// assert_eq!(percent_encode("hello world"), "hello%20world");
/// assert_eq!(percent_encode("a=b&c"), "a%3Db%26c");
/// ```
pub fn percent_encode(input: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut result = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            result.push(byte as char);
        } else {
            result.push('%');
            result.push(HEX[usize::from(byte >> 4)] as char);
            result.push(HEX[usize::from(byte & 0x0f)] as char);
        }
    }
    result
}
