#![no_main]

use h11wire::uri::{Uri, percent_encode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(uri) = Uri::parse(s) {
        let _ = uri.scheme();
        let _ = uri.host();
        let _ = uri.port_or_default();
        let _ = uri.host_header();
        let _ = uri.origin_form();
        let _ = uri.absolute_form();
        let _ = uri.to_string();

        // base として相対参照を解決
        if uri.is_absolute() {
            for reference in ["/test", "../a/./b", "?q", "//other.example/x", ""] {
                let _ = uri.resolve(reference);
            }
        }
    }

    // 任意の文字列を参照として解決
    if let Ok(base) = Uri::parse("http://example.com/a/b/c") {
        if let Ok(resolved) = base.resolve(s) {
            let _ = resolved.origin_form();
        }
    }

    let encoded = percent_encode(s);
    assert!(encoded.bytes().all(|b| b.is_ascii_graphic()));
});
