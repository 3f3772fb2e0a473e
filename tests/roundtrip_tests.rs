mod common;

use common::{PropertiesFilter, init_logging};
use proptest::prelude::*;
use skeletext::{
    BatchItem, FilterRegistry, MemoryOutput, OutputTarget, Pipeline, PipelineDriver, RawDocument,
    WriterOptions, WriterStep, encoding,
};

fn key_strategy() -> impl Strategy<Value = String> {
    proptest::string::string_regex("[a-z][a-z0-9_.]{0,10}").expect("valid key regex")
}

fn value_strategy() -> impl Strategy<Value = String> {
    let markup = r#"(<b>[a-z ]{1,8}</b>|<br/>|<a href="x">[a-z]{1,5}</a>)?"#;
    proptest::string::string_regex(&format!(
        "[A-Za-z0-9 ,.!?=éü日本]{{0,12}}{}[A-Za-z .]{{0,6}}",
        markup
    ))
    .expect("valid value regex")
}

fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| format!("{}={}", key, value)),
        1 => proptest::string::string_regex("# [a-z =]{0,10}").expect("valid comment regex"),
        1 => Just(String::new()),
    ]
}

fn document_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec(line_strategy(), 1..12),
        prop_oneof![Just("\n"), Just("\r\n")],
        any::<bool>(),
    )
        .prop_map(|(lines, line_break, trailing)| {
            let mut text = lines.join(line_break);
            if trailing {
                text.push_str(line_break);
            }
            text
        })
}

fn run_in_memory(raw: RawDocument, options: WriterOptions) -> Result<Vec<u8>, String> {
    let output = MemoryOutput::new();
    let pipeline = Pipeline::default()
        .with_filter(PropertiesFilter::new())
        .with_step(WriterStep::new(options));
    let report = PipelineDriver::new(pipeline)
        .with_item(BatchItem::new(raw).with_output(OutputTarget::Memory(output.clone())))
        .process_batch()
        .map_err(|e| e.to_string())?;
    if !report.is_complete_success() {
        return Err(format!("batch did not succeed: {:?}", report.items));
    }
    Ok(output.bytes())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn untouched_documents_roundtrip_byte_for_byte(text in document_strategy()) {
        let bytes = run_in_memory(RawDocument::from_text(&text), WriterOptions::new())
            .map_err(TestCaseError::fail)?;
        prop_assert_eq!(String::from_utf8_lossy(&bytes), text);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn utf16_documents_keep_encoding_and_bom(text in document_strategy()) {
        let input = encoding::encode(&text, encoding_rs::UTF_16LE, true);
        prop_assert!(!input.lossy);

        let raw = RawDocument::from_bytes(input.bytes.clone());
        let bytes = run_in_memory(raw, WriterOptions::new()).map_err(TestCaseError::fail)?;
        prop_assert_eq!(bytes, input.bytes);
    }
}

#[test]
fn test_output_encoding_and_line_breaks_can_change() {
    init_logging();
    let text = "title=Caf\u{e9} <b>ouvert</b>\n# menu\nitem=Cr\u{ea}pe\n";
    let options = WriterOptions::new()
        .with_encoding("UTF-16BE")
        .with_bom(true)
        .with_line_break("\r\n");

    let bytes = run_in_memory(RawDocument::from_text(text), options).unwrap();
    assert_eq!(bytes[..2], [0xFE, 0xFF]);
    let (decoded, _, had_errors) = encoding_rs::UTF_16BE.decode(&bytes);
    assert!(!had_errors);
    assert_eq!(decoded, text.replace('\n', "\r\n"));
}

#[test]
fn test_latin1_input_is_written_back_in_latin1() {
    let raw = RawDocument::from_bytes(b"name=Fran\xe7ois\n".to_vec()).with_encoding("windows-1252");
    let bytes = run_in_memory(raw, WriterOptions::new()).unwrap();
    assert_eq!(bytes, b"name=Fran\xe7ois\n");
}

#[test]
fn test_files_are_found_by_extension_and_written_to_disk() {
    init_logging();
    let tmp = tempfile::tempdir().unwrap();
    let input = tmp.path().join("messages.properties");
    let output = tmp.path().join("out").join("fr").join("messages.properties");
    let text = "# Messages\r\nwelcome=Welcome, <i>{0}</i>!\r\n\r\nlogout=Sign out\r\n";
    std::fs::write(&input, text).unwrap();

    let pipeline = Pipeline::default()
        .with_filters(FilterRegistry::new().with(|| Box::new(PropertiesFilter::new())))
        .with_step(WriterStep::new(WriterOptions::new()));
    let mut driver = PipelineDriver::new(pipeline).with_item(
        BatchItem::new(RawDocument::from_path(&input))
            .with_output(OutputTarget::Path(output.clone())),
    );
    let report = driver.process_batch().unwrap();
    assert!(report.is_complete_success());
    assert_eq!(report.items[0].name, input.display().to_string());
    assert_eq!(std::fs::read_to_string(&output).unwrap(), text);
}

#[test]
fn test_missing_file_fails_its_item() {
    let tmp = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::default()
        .with_filters(FilterRegistry::new().with(|| Box::new(PropertiesFilter::new())))
        .with_step(WriterStep::new(WriterOptions::new()));
    let mut driver = PipelineDriver::new(pipeline).with_item(BatchItem::new(
        RawDocument::from_path(tmp.path().join("absent.properties")),
    ));
    let report = driver.process_batch().unwrap();
    assert_eq!(report.items[0].failure().unwrap().stage, "filter");
}
