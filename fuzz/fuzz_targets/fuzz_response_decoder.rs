#![no_main]

use h11wire::{DecoderLimits, Progress, ResponseDecoder};
use libfuzzer_sys::fuzz_target;

fn drain(decoder: &mut ResponseDecoder) {
    let mut out = [0u8; 64];
    loop {
        match decoder.read_body(&mut out) {
            Ok((Progress::ContinueParsing, _)) => {}
            Ok(_) | Err(_) => break,
        }
    }
}

fuzz_target!(|data: &[u8]| {
    // 一括でデコード
    let mut decoder = ResponseDecoder::new();
    decoder.feed(data);
    let whole = decoder.decode();
    let _ = decoder.mark_eof();

    // HEAD リクエストへのレスポンスとしてデコード
    let mut decoder = ResponseDecoder::new();
    decoder.set_expect_no_body(true);
    decoder.feed(data);
    if let Ok(Some(head)) = decoder.decode_head() {
        let _ = head.is_keep_alive();
        let _ = head.location();
        drain(&mut decoder);
    }

    // 分割して feed しても結果は変わらない
    let mut decoder = ResponseDecoder::new();
    let mut fragmented = Ok(None);
    for part in data.chunks(7) {
        decoder.feed(part);
        fragmented = decoder.decode();
        if !matches!(fragmented, Ok(None)) {
            break;
        }
    }
    match (&whole, &fragmented) {
        (Ok(Some(a)), Ok(Some(b))) => assert_eq!(a, b),
        (Ok(Some(_)), other) => panic!("fragmented decode diverged: {:?}", other),
        _ => {}
    }

    // 小さな上限
    let mut decoder = ResponseDecoder::with_limits(DecoderLimits::default().max_header_bytes(64));
    decoder.feed(data);
    let _ = decoder.decode();
});
