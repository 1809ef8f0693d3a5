use gamevault_provision::parse_manifest_line;

#[test]
fn good_lines_parse_to_exactly_five_fields() {
    let cases = [
        (
            "games/2048.bin puzzle 1.0 alice bob",
            ("games/2048.bin", "puzzle", "1.0", vec!["alice", "bob"]),
        ),
        (
            "  /opt/games/snake-v2 snake_classic 3 drew",
            ("/opt/games/snake-v2", "snake_classic", "3", vec!["drew"]),
        ),
        (
            "games/t.bin tetris 10.42 a b c d",
            ("games/t.bin", "tetris", "10.42", vec!["a", "b", "c", "d"]),
        ),
        (
            "rel.path game.name 0.0 user_1",
            ("rel.path", "game.name", "0.0", vec!["user_1"]),
        ),
    ];
    for (line, (source_path, name, version, users)) in cases {
        let entry = parse_manifest_line(line)
            .unwrap_or_else(|| panic!("expected line to parse: {line:?}"));
        assert_eq!(entry.source_path, source_path, "line: {line:?}");
        assert_eq!(entry.name, name, "line: {line:?}");
        assert_eq!(entry.version, version, "line: {line:?}");
        assert_eq!(entry.users, users, "line: {line:?}");
    }
}

#[test]
fn bad_lines_are_rejected() {
    let cases = [
        "",
        "   ",
        "games/2048.bin",
        "games/2048.bin puzzle",
        "games/2048.bin puzzle 1.0",
        "games/2048.bin puzzle v1.0 alice",
        "games/2048.bin puzzle 1. alice",
        "games/2048.bin puzzle .5 alice",
        "games/2048.bin puzzle 1.0.0 alice",
        "games/2048.bin puz/zle 1.0 alice",
        "games/2048.bin puzzle 1.0 al-ice",
        "games/2048.bin puzzle 1.0 alice bob!",
        "games/20 48.bin puzzle 1.0",
        "# games/2048.bin puzzle 1.0 alice",
    ];
    for line in cases {
        assert!(
            parse_manifest_line(line).is_none(),
            "expected line to be rejected: {line:?}"
        );
    }
}

#[test]
fn users_keep_manifest_order_without_duplicates() {
    let entry = parse_manifest_line("games/a.bin a 1.0 hunter drew ben drew lou")
        .expect("line should parse");
    assert_eq!(entry.users, vec!["hunter", "drew", "ben", "lou"]);
}
