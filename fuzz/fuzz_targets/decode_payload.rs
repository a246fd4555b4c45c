#![no_main]
use deviceapps_pack::payload;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = payload::decode(data) {
        let encoded = payload::encode(&record);
        assert_eq!(encoded.len(), payload::encoded_len(&record));
        let _ = payload::decode(&encoded).unwrap();
    }
});
