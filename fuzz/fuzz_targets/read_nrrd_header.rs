#![no_main]
use libfuzzer_sys::fuzz_target;
use medvol::NrrdHeader;

fuzz_target!(|data: &[u8]| {
    let mut src = data;
    if let Ok(header) = NrrdHeader::from_reader(&mut src) {
        let _ = header.sample_count();
        let _ = header.resolved_space_dimension();
        let mut out = Vec::new();
        let _ = header.write_to(&mut out);
    }
});
