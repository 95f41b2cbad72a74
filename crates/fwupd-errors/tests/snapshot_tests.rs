//! Snapshot tests for error message formatting.

use fwupd_errors::{ErrorCategory, ErrorContext, ErrorKind, FwupdError};
use insta::assert_snapshot;

#[test]
fn test_constant_mismatch_message() {
    let err = FwupdError::invalid_data("constant value invalid for Foo.val, expected 0x1234 and got 0x0")
        .prefixed("failed to unpack Foo");
    assert_snapshot!(err.to_string(), @"failed to unpack Foo: constant value invalid for Foo.val, expected 0x1234 and got 0x0");
}

#[test]
fn test_context_display() {
    let ctx = ErrorContext::new("send sync").with("cmd", "BufferWrite").with("seq", 12);
    assert_snapshot!(ctx.to_string(), @"send sync (cmd=BufferWrite, seq=12)");
}

#[test]
fn test_kind_names() {
    let names: Vec<&str> = [
        ErrorKind::NotFound,
        ErrorKind::InvalidFile,
        ErrorKind::TimedOut,
        ErrorKind::ResourceLimit,
    ]
    .iter()
    .map(|k| k.as_str())
    .collect();
    assert_snapshot!(names.join(","), @"not-found,invalid-file,timed-out,resource-limit");
}

#[test]
fn test_category_display() {
    assert_snapshot!(ErrorCategory::MalformedInput.to_string(), @"MalformedInput");
    assert_snapshot!(ErrorKind::Busy.category().to_string(), @"Transport");
}
