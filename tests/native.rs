#![cfg(all(unix, feature = "draco_cli"))]

use std::path::Path;

use bevy_progressive_points::{
    CodecKind,
    DecodeError,
    DecoderConfig,
    DecoderManager,
    io::{
        decode,
        native::DracoCliDecoder,
        ply::write_ascii_ply,
    },
    random_points,
};


// stands in for draco_decoder: `-i <input> -o <output>` copies the input through
const PASSTHROUGH: &str = "cp \"$2\" \"$4\"\n";
const BROKEN: &str = "echo 'corrupt draco header' >&2\nexit 3\n";

fn script_config(dir: &Path, body: &str) -> DecoderConfig {
    let script = dir.join("decoder.sh");
    std::fs::write(&script, body).unwrap();

    DecoderConfig {
        native_command: vec!["sh".to_string(), script.to_string_lossy().into_owned()],
        ..Default::default()
    }
}


#[test]
fn test_missing_program_is_unavailable() {
    let config = DecoderConfig {
        native_command: vec!["no-such-draco-decoder-on-path".to_string()],
        ..Default::default()
    };

    assert!(matches!(
        DracoCliDecoder::new(&config),
        Err(DecodeError::DecoderUnavailable(_)),
    ));
}

#[test]
fn test_empty_command_is_unavailable() {
    let config = DecoderConfig {
        native_command: Vec::new(),
        ..Default::default()
    };

    assert!(matches!(
        DracoCliDecoder::new(&config),
        Err(DecodeError::DecoderUnavailable(_)),
    ));
}

#[test]
fn test_platform_default_decodes_through_tool() {
    let scratch = tempfile::tempdir().unwrap();
    let decoders = DecoderManager::platform_default(script_config(scratch.path(), PASSTHROUGH));

    let cloud = random_points(50, 7);
    let payload = write_ascii_ply(&cloud);

    let decoded = pollster::block_on(decode(payload.as_bytes(), CodecKind::Draco, &decoders)).unwrap();
    assert_eq!(decoded.vertex_count(), 50);
    assert!(decoded.colors().is_some());

    let again = pollster::block_on(decode(payload.as_bytes(), CodecKind::Draco, &decoders)).unwrap();
    assert_eq!(again.vertex_count(), 50);
    assert_eq!(decoders.initialization_count(), 1);

    decoders.shutdown();
    assert!(matches!(
        pollster::block_on(decode(payload.as_bytes(), CodecKind::Draco, &decoders)),
        Err(DecodeError::DecoderUnavailable(_)),
    ));
}

#[test]
fn test_tool_failure_is_reported() {
    let scratch = tempfile::tempdir().unwrap();
    let decoder = DracoCliDecoder::new(&script_config(scratch.path(), BROKEN)).unwrap();

    match decoder.decode_blocking(b"DRACO") {
        Err(DecodeError::Backend(message)) => assert!(message.contains("corrupt draco header")),
        other => panic!("expected backend error, got {other:?}"),
    }
}
