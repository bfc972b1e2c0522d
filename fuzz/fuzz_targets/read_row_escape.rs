#![no_main]

use libfuzzer_sys::fuzz_target;

use zc_csv::RowReaderBuilder;

fuzz_target!(|data: &[u8]| {
    let mut reader = RowReaderBuilder::new()
        .delimiter(b';')
        .escapechar(b'\\')
        .yield_incomplete_row(true)
        .from_reader(data);

    while reader.read_row() {
        for cell in reader.row().iter() {
            let _ = cell.decode();
        }
    }
});
