#![no_main]
use deviceapps_pack::{Compress, ContainerReader, Options};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let plain = Options::new().compress(Compress::None);
    for result in ContainerReader::with_options(data, &plain).records() {
        if result.is_err() {
            break;
        }
    }
    for result in ContainerReader::new(data).records() {
        if result.is_err() {
            break;
        }
    }
});
