#![no_main]

use arbitrary::Arbitrary;
use h11wire::{ChunkedDecoder, DecoderLimits, Progress, encode_chunks};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzChunked {
    chunks: Vec<Vec<u8>>,
    split_hint: u8,
    out_hint: u8,
    raw: Vec<u8>,
}

/// 受信ウィンドウを `split` バイトずつ広げながらデコードする
fn decode(input: &[u8], split: usize, out_len: usize) -> Option<Vec<u8>> {
    let mut decoder = ChunkedDecoder::new(DecoderLimits::default());
    let mut window = Vec::new();
    let mut fed = 0;
    let mut body = Vec::new();
    let mut out = vec![0u8; out_len];
    loop {
        let mut cursor = 0;
        let (progress, n) = decoder.read(&window, &mut cursor, &mut out).ok()?;
        window.drain(..cursor);
        body.extend_from_slice(&out[..n]);
        match progress {
            Progress::Done => return Some(body),
            Progress::ContinueParsing => {}
            Progress::NeedMoreData => {
                if fed == input.len() {
                    return None;
                }
                let end = (fed + split).min(input.len());
                window.extend_from_slice(&input[fed..end]);
                fed = end;
            }
        }
    }
}

fuzz_target!(|input: FuzzChunked| {
    let chunks = input
        .chunks
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .take(64)
        .collect::<Vec<_>>();
    let expected = chunks.concat();
    let split = usize::from(input.split_hint % 32) + 1;
    let out_len = usize::from(input.out_hint % 64) + 1;

    let refs = chunks.iter().map(Vec::as_slice).collect::<Vec<_>>();
    let encoded = encode_chunks(&refs);
    assert_eq!(decode(&encoded, split, out_len), Some(expected));

    // 任意のバイト列でも panic しない
    let _ = decode(&input.raw, split, out_len);
});
