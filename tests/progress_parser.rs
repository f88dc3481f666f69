use syncjob::progress::ProgressParser;

#[test]
fn extracts_current_file_percent() {
    let mut parser = ProgressParser::new();
    parser.feed_line("      1,234,567  45%    1.23MB/s    0:00:12");

    let snap = parser.snapshot();
    assert_eq!(snap.current_file_percent, 45.0);
    assert_eq!(snap.bytes_transferred, 1_234_567);
}

#[test]
fn malformed_percent_defaults_to_zero() {
    let mut parser = ProgressParser::new();
    parser.feed_line("      1,234,567  45%    1.23MB/s    0:00:12");
    assert_eq!(parser.snapshot().current_file_percent, 45.0);

    parser.feed_line("garbage xx% more");
    assert_eq!(parser.snapshot().current_file_percent, 0.0);
}

#[test]
fn overall_percent_from_to_check() {
    let mut parser = ProgressParser::new();
    parser.feed_line("  1,000  10%  1.00MB/s  0:00:10 (xfr#1, to-check=7/10)");

    let snap = parser.snapshot();
    assert_eq!(snap.files_completed, 3);
    assert_eq!(snap.total_files, 10);
    assert!((snap.overall_percent - 30.0).abs() < 1e-9);
}

#[test]
fn overall_percent_is_monotonic_over_well_formed_sequence() {
    let mut parser = ProgressParser::new();
    let lines = [
        "  100  5%  1.00MB/s  0:01:00 (xfr#1, to-check=9/10)",
        "  200  50%  1.00MB/s  0:00:50 (xfr#2, to-check=7/10)",
        "  300  80%  1.00MB/s  0:00:30 (xfr#4, to-check=4/10)",
        "  400  100%  1.00MB/s  0:00:00 (xfr#9, to-check=0/10)",
    ];

    let mut last = 0.0;
    for line in lines {
        parser.feed_line(line);
        let now = parser.snapshot().overall_percent;
        assert!(now >= last, "overall percent decreased: {last} -> {now}");
        last = now;
    }
    assert!((last - 100.0).abs() < 1e-9);
}

#[test]
fn malformed_to_check_retains_previous_overall() {
    let mut parser = ProgressParser::new();
    parser.feed_line("  100  5%  (to-check=5/10)");
    let before = parser.snapshot().overall_percent;

    // Zero total must not move the overall percentage.
    parser.feed_line("  200  10%  (to-check=0/0)");
    assert_eq!(parser.snapshot().overall_percent, before);
}

#[test]
fn speed_unit_conversion() {
    let cases = [
        ("  1  1%  500B/s  0:00:01", 500.0),
        ("  1  1%  500KB/s  0:00:01", 500.0 * 1024.0),
        ("  1  1%  1.50MB/s  0:00:01", 1.5 * 1024.0 * 1024.0),
        ("  1  1%  2GB/s  0:00:01", 2.0 * 1024.0 * 1024.0 * 1024.0),
    ];

    for (line, expected) in cases {
        let mut parser = ProgressParser::new();
        parser.feed_line(line);
        let got = parser.snapshot().speed_bytes_per_sec;
        assert!((got - expected).abs() < 1e-6, "line {line:?}: {got} != {expected}");
    }
}

#[test]
fn eta_parsing_both_shapes() {
    let mut parser = ProgressParser::new();
    parser.feed_line("  1  1%  1.00MB/s  0:01:30");
    assert_eq!(parser.snapshot().eta_seconds, 90);

    parser.feed_line("  1  2%  1.00MB/s  12:34");
    assert_eq!(parser.snapshot().eta_seconds, 12 * 60 + 34);
}

#[test]
fn file_transfer_lines_update_current_file() {
    let mut parser = ProgressParser::new();
    parser.feed_line("sending incremental file list");
    assert_eq!(parser.snapshot().current_file, "");

    parser.feed_line("photos/2024/img_0001.jpg");
    assert_eq!(parser.snapshot().current_file, "photos/2024/img_0001.jpg");

    // Boilerplate must not clobber the file name.
    parser.feed_line("sent 1,234 bytes  received 56 bytes");
    assert_eq!(parser.snapshot().current_file, "photos/2024/img_0001.jpg");
}

#[test]
fn itemized_lines_strip_the_change_marker() {
    let mut parser = ProgressParser::new();
    parser.feed_line(">f+++++++++ docs/new file.txt");
    assert_eq!(parser.snapshot().current_file, "docs/new file.txt");
}

#[test]
fn overlong_lines_are_ignored() {
    let mut parser = ProgressParser::new();
    parser.feed_line("real.txt");
    parser.feed_line(&"x".repeat(4096));
    assert_eq!(parser.snapshot().current_file, "real.txt");
}

#[test]
fn parser_never_fails_on_garbage() {
    let mut parser = ProgressParser::new();
    parser.feed("\u{0}\u{1}%%%\r\rto-check=/\n%\n:::\n");
    // Reaching this point without a panic is the property under test.
    let _ = parser.snapshot();
}
