//! ResponseDecoder のプロパティテスト (decoder.rs)

use h11wire::{DecoderLimits, ParseError, Response, ResponseDecoder, encode_chunks};
use pbt::{extension_headers, split_at_points, split_points, status_with_body};
use proptest::prelude::*;

// ========================================
// Strategy 定義
// ========================================

#[derive(Debug, Clone)]
enum BodyEncoding {
    ContentLength,
    Chunked(Vec<usize>),
}

fn body_encoding() -> impl Strategy<Value = BodyEncoding> {
    prop_oneof![
        Just(BodyEncoding::ContentLength),
        proptest::collection::vec(1usize..64, 0..8).prop_map(BodyEncoding::Chunked),
    ]
}

fn reason_phrase() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[A-Za-z]{1,12}".prop_map(|s| s),
        ("[A-Za-z]{1,8}", "[A-Za-z]{1,8}").prop_map(|(a, b)| format!("{} {}", a, b)),
    ]
}

#[derive(Debug, Clone)]
struct Generated {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    encoding: BodyEncoding,
}

fn generated_response() -> impl Strategy<Value = Generated> {
    (
        status_with_body(),
        reason_phrase(),
        extension_headers(6),
        proptest::collection::vec(any::<u8>(), 0..256),
        body_encoding(),
    )
        .prop_map(|(status, reason, headers, body, encoding)| Generated {
            status,
            reason,
            headers,
            body,
            encoding,
        })
}

impl Generated {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason).into_bytes();
        for (name, value) in &self.headers {
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        match &self.encoding {
            BodyEncoding::ContentLength => {
                buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
                buf.extend_from_slice(&self.body);
            }
            BodyEncoding::Chunked(sizes) => {
                buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n\r\n");
                let chunks = split_by_sizes(&self.body, sizes);
                buf.extend_from_slice(&encode_chunks(&chunks));
            }
        }
        buf
    }
}

fn split_by_sizes<'a>(data: &'a [u8], sizes: &[usize]) -> Vec<&'a [u8]> {
    let mut chunks = Vec::new();
    let mut rest = data;
    for &size in sizes {
        if rest.is_empty() {
            break;
        }
        let (head, tail) = rest.split_at(size.min(rest.len()));
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

fn decode_pieces(pieces: &[&[u8]]) -> Result<Option<Response>, ParseError> {
    let mut decoder = ResponseDecoder::new();
    let mut decoded = None;
    for piece in pieces {
        decoder.feed(piece);
        if decoded.is_none() {
            decoded = decoder.decode()?;
        }
    }
    if decoded.is_none() {
        decoded = decoder.decode()?;
    }
    Ok(decoded)
}

// ========================================
// 分割に対する不変性
// ========================================

proptest! {
    #[test]
    fn prop_decode_is_independent_of_fragmentation(
        (generated, points) in generated_response().prop_flat_map(|g| {
            let len = g.to_bytes().len();
            (Just(g), split_points(len, 16))
        })
    ) {
        let bytes = generated.to_bytes();
        let whole = decode_pieces(&[&bytes]).unwrap().unwrap();
        let pieces = split_at_points(&bytes, &points);
        let fragmented = decode_pieces(&pieces).unwrap().unwrap();

        prop_assert_eq!(&fragmented, &whole);
        prop_assert_eq!(whole.status_code, generated.status);
        prop_assert_eq!(&whole.reason_phrase, &generated.reason);
        prop_assert_eq!(&whole.body, &generated.body);
        for (name, _) in &generated.headers {
            prop_assert!(whole.headers.contains(name));
        }
    }

    #[test]
    fn prop_decode_byte_by_byte(generated in generated_response()) {
        let bytes = generated.to_bytes();
        let pieces = bytes.chunks(1).collect::<Vec<_>>();
        let response = decode_pieces(&pieces).unwrap().unwrap();
        prop_assert_eq!(response.status_code, generated.status);
        prop_assert_eq!(&response.body, &generated.body);
    }

    #[test]
    fn prop_incomplete_response_is_not_decoded(
        (generated, cut) in generated_response().prop_flat_map(|g| {
            let len = g.to_bytes().len();
            (Just(g), 0..len)
        })
    ) {
        let bytes = generated.to_bytes();
        let mut decoder = ResponseDecoder::new();
        decoder.feed(&bytes[..cut]);
        prop_assert!(decoder.decode().unwrap().is_none());
    }
}

// ========================================
// 上限
// ========================================

proptest! {
    #[test]
    fn prop_header_limit_is_independent_of_fragmentation(
        value_len in 64usize..512,
        step in 1usize..32,
    ) {
        let limits = DecoderLimits::default().max_header_bytes(48);
        let bytes = format!(
            "HTTP/1.1 200 OK\r\nX-Long: {}\r\nContent-Length: 0\r\n\r\n",
            "a".repeat(value_len)
        )
        .into_bytes();

        let mut decoder = ResponseDecoder::with_limits(limits);
        let mut result = Ok(None);
        for piece in bytes.chunks(step) {
            decoder.feed(piece);
            result = decoder.decode();
            if result.is_err() {
                break;
            }
        }
        let too_big = matches!(result, Err(ParseError::DataTooBig { limit: 48, .. }));
        prop_assert!(too_big, "unexpected result: {:?}", result);
    }

    #[test]
    fn prop_garbage_status_line_is_invalid(garbage in "[A-Za-z]{1,8}") {
        let bytes = format!("HTTP/1.1 {} OK\r\n\r\n", garbage).into_bytes();
        let mut decoder = ResponseDecoder::new();
        decoder.feed(&bytes);
        let result = decoder.decode();
        prop_assert!(matches!(result, Err(ParseError::Invalid(_))));
    }
}
