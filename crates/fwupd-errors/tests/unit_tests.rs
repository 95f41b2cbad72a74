//! Unit tests for error classification and prefixing.

use fwupd_errors::prelude::*;

fn fail(kind: ErrorKind) -> Result<()> {
    Err(FwupdError::new(kind, "inner"))
}

#[test]
fn test_prefix_keeps_kind() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let err = fail(ErrorKind::Busy)
        .prefix("failed to send INIT")
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::Busy);
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "failed to send INIT: inner");
    Ok(())
}

#[test]
fn test_nested_prefixes_compose_outermost_first() -> std::result::Result<(), Box<dyn std::error::Error>>
{
    let err = fail(ErrorKind::InvalidFile)
        .prefix("section")
        .with_prefix(|| format!("file at 0x{:x}", 0x48))
        .prefix("volume")
        .err()
        .ok_or("expected error")?;
    assert_eq!(err.to_string(), "volume: file at 0x48: section: inner");
    assert_eq!(err.category(), ErrorCategory::MalformedInput);
    Ok(())
}

#[test]
fn test_context_prefix() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let ctx = ErrorContext::new("wait ack").with("seq", 7);
    let err = fail(ErrorKind::Protocol).context(ctx).err().ok_or("expected error")?;
    assert_eq!(err.to_string(), "wait ack (seq=7): inner");
    assert_eq!(err.category(), ErrorCategory::Protocol);
    Ok(())
}

#[test]
fn test_io_prefix_preserves_io_kind() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let io: std::result::Result<(), std::io::Error> =
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stream closed"));
    let err = io.prefix("read").err().ok_or("expected error")?;
    assert_eq!(err.kind(), ErrorKind::Io);
    match err {
        FwupdError::Io(inner) => assert_eq!(inner.kind(), std::io::ErrorKind::BrokenPipe),
        other => return Err(format!("unexpected {other:?}").into()),
    }
    Ok(())
}

#[test]
fn test_terminal_kinds() {
    assert!(FwupdError::not_found("x").is_terminal());
    assert!(FwupdError::permission_denied("x").is_terminal());
    assert!(FwupdError::cancelled("x").is_terminal());
    assert!(!FwupdError::busy("x").is_terminal());
    assert!(!FwupdError::write("x").is_terminal());
}
