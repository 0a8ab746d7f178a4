mod common;

use std::fs;

use assert_cmd::Command;
use predicates::{prelude::PredicateBooleanExt, str::contains};

use common::{ExtractWorkspace, GEO_CODEBOOK, SIMPLE_CODEBOOK};

fn ipums_tsv() -> Command {
    let mut cmd = Command::cargo_bin("ipums-tsv").expect("binary exists");
    cmd.env_remove("RUST_LOG");
    cmd
}

const A_BUCKETS: &str = r#"{"a_ranges": {"field": "A", "buckets": [[0, 5, "low"], [6, 10, "high"]]}}"#;

#[test]
fn convert_writes_tsv_and_sql_with_default_options() {
    let ws = ExtractWorkspace::new("usa_00001", SIMPLE_CODEBOOK, "0107\n0300\n");

    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .success()
        .stderr(contains("Finished parsing 2 lines"));

    assert_eq!(ws.read_artifact("tsv"), "A\tAGE\n1\t7\n3\t0\n");
    assert_eq!(
        ws.read_artifact("sql"),
        "CREATE TABLE `simple_extract`(\n`A` varchar(64) DEFAULT NULL,\n`AGE` varchar(64) DEFAULT NULL\n) ENGINE=InnoDB DEFAULT CHARSET=utf8"
    );
}

#[test]
fn convert_accepts_the_dat_path_as_base() {
    let ws = ExtractWorkspace::new("usa_00002", SIMPLE_CODEBOOK, "0107\n");
    let dat = ws.artifact("dat");

    ipums_tsv()
        .args(["convert", dat.to_str().unwrap()])
        .assert()
        .success();

    assert_eq!(ws.read_artifact("tsv"), "A\tAGE\n1\t7\n");
}

#[test]
fn convert_applies_buckets_and_drops_originals() {
    let ws = ExtractWorkspace::new("usa_00003", SIMPLE_CODEBOOK, "0301\n9902\n");
    ws.write("buckets/a.json", A_BUCKETS);

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--bucket",
            "a_ranges",
            "--buckets-dir",
            &ws.path_str("buckets"),
        ])
        .assert()
        .success();

    assert_eq!(ws.read_artifact("tsv"), "AGE\tA_bucketed\n1\tlow\n2\t99\n");
    assert!(ws.read_artifact("sql").contains("`A_bucketed` varchar(64)"));
}

#[test]
fn convert_keep_original_and_ignore_shape_the_columns() {
    let ws = ExtractWorkspace::new("usa_00004", SIMPLE_CODEBOOK, "0707\n");
    ws.write("buckets/a.yaml", "a_ranges:\n  field: A\n  buckets:\n    - [0, 5, low]\n    - [6, 10, high]\n");

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--buckets",
            "a_ranges",
            "--keep_original",
            "--ignore",
            "AGE",
            "--buckets-dir",
            &ws.path_str("buckets"),
        ])
        .assert()
        .success();

    assert_eq!(ws.read_artifact("tsv"), "A\tA_bucketed\n7\thigh\n");
}

#[test]
fn convert_warns_about_unknown_buckets_and_continues() {
    let ws = ExtractWorkspace::new("usa_00005", SIMPLE_CODEBOOK, "0107\n");
    ws.write("buckets/a.json", A_BUCKETS);

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--bucket",
            "missing,a_ranges",
            "--buckets-dir",
            &ws.path_str("buckets"),
        ])
        .assert()
        .success()
        .stderr(contains("Couldn't find a bucket matching 'missing'"));

    assert_eq!(ws.read_artifact("tsv"), "AGE\tA_bucketed\n7\tlow\n");
}

#[test]
fn convert_full_pumas_derives_composite_code_and_area() {
    let ws = ExtractWorkspace::new("usa_00006", GEO_CODEBOOK, "360010012345\n");
    ws.write("pumas.json", r#"{"3600100": {"area": "Albany County"}}"#);

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--full-pumas",
            "--geography",
            &ws.path_str("pumas.json"),
        ])
        .assert()
        .success();

    assert_eq!(
        ws.read_artifact("tsv"),
        "STATEFIP\tPUMA\tPERWT\tPUMAAREA\n36\t3600100\t123.45\tAlbany County\n"
    );
}

#[test]
fn convert_missing_geography_key_warns_by_default() {
    let ws = ExtractWorkspace::new("usa_00007", GEO_CODEBOOK, "010999900100\n");
    ws.write("pumas.json", "{}");

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--full-pumas",
            "--geography",
            &ws.path_str("pumas.json"),
        ])
        .assert()
        .success()
        .stderr(contains("'0109999'").and(contains("has no PUMA area")));

    assert_eq!(
        ws.read_artifact("tsv"),
        "STATEFIP\tPUMA\tPERWT\tPUMAAREA\n1\t0109999\t1\t\n"
    );
}

#[test]
fn convert_missing_geography_key_fails_when_strict() {
    let ws = ExtractWorkspace::new("usa_00008", GEO_CODEBOOK, "010999900100\n");
    ws.write("pumas.json", "{}");

    ipums_tsv()
        .args([
            "convert",
            &ws.base_str(),
            "--full-pumas",
            "--strict-geography",
            "--geography",
            &ws.path_str("pumas.json"),
        ])
        .assert()
        .failure()
        .stderr(contains("not present in the geography table"));
}

#[test]
fn convert_full_pumas_is_ignored_without_geography_columns() {
    let ws = ExtractWorkspace::new("usa_00009", SIMPLE_CODEBOOK, "0107\n");

    ipums_tsv()
        .args(["convert", &ws.base_str(), "--full-pumas"])
        .assert()
        .success()
        .stderr(contains("Ignoring"));

    assert_eq!(ws.read_artifact("tsv"), "A\tAGE\n1\t7\n");
}

#[test]
fn convert_small_buffer_keeps_every_record() {
    let ws = ExtractWorkspace::new(
        "usa_00010",
        SIMPLE_CODEBOOK,
        "0101\n0202\n0303\n0404\n0505\n",
    );

    ipums_tsv()
        .args(["convert", &ws.base_str(), "--buffer", "2"])
        .assert()
        .success();

    let output = ws.read_artifact("tsv");
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines, vec!["A\tAGE", "1\t1", "2\t2", "3\t3", "4\t4", "5\t5"]);
}

#[test]
fn convert_rejects_zero_buffer() {
    let ws = ExtractWorkspace::new("usa_00011", SIMPLE_CODEBOOK, "0101\n");

    ipums_tsv()
        .args(["convert", &ws.base_str(), "--buffer", "0"])
        .assert()
        .failure()
        .stderr(contains("Buffer size must be at least 1"));
}

#[test]
fn convert_can_write_to_stdout() {
    let ws = ExtractWorkspace::new("usa_00012", SIMPLE_CODEBOOK, "0107\n");

    ipums_tsv()
        .args(["convert", &ws.base_str(), "-o", "-"])
        .assert()
        .success()
        .stdout("A\tAGE\n1\t7\n");

    assert!(!ws.artifact("tsv").exists());
    assert!(ws.artifact("sql").exists());
}

#[test]
fn convert_fails_when_data_file_is_missing() {
    let ws = ExtractWorkspace::new("usa_00013", SIMPLE_CODEBOOK, "");
    fs::remove_file(ws.artifact("dat")).expect("remove dat");

    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .failure()
        .stderr(contains("Opening data file"));
}

#[test]
fn convert_empty_data_file_writes_header_only() {
    let ws = ExtractWorkspace::new("usa_00014", SIMPLE_CODEBOOK, "");

    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .success();

    assert_eq!(ws.read_artifact("tsv"), "A\tAGE\n");
}

#[test]
fn convert_ignore_drops_bucketed_column_with_or_without_originals() {
    for (name, keep_original, expected_tsv, expected_sql_columns) in [
        ("usa_00015", false, "AGE\n1\n2\n", vec!["AGE"]),
        ("usa_00016", true, "A\tAGE\n3\t1\n99\t2\n", vec!["A", "AGE"]),
    ] {
        let ws = ExtractWorkspace::new(name, SIMPLE_CODEBOOK, "0301\n9902\n");
        ws.write("buckets/a.json", A_BUCKETS);

        let mut cmd = ipums_tsv();
        cmd.args([
            "convert",
            &ws.base_str(),
            "--bucket",
            "a_ranges",
            "--ignore",
            "A_bucketed",
            "--buckets-dir",
            &ws.path_str("buckets"),
        ]);
        if keep_original {
            cmd.arg("--keep-original");
        }
        cmd.assert().success();

        assert_eq!(ws.read_artifact("tsv"), expected_tsv);
        let sql = ws.read_artifact("sql");
        assert!(!sql.contains("A_bucketed"));
        let declared: Vec<&str> = sql
            .lines()
            .filter_map(|line| line.strip_prefix('`'))
            .filter_map(|line| line.split('`').next())
            .collect();
        assert_eq!(declared, expected_sql_columns);
    }
}

#[test]
fn convert_writes_quotes_and_lone_empty_values_verbatim() {
    let codebook = "\
Variable   Columns   Len
OCC        1-1       1     Occupation
N          2-3       2     Count

OCC        Occupation
1          Clergy \"ordained\"
";
    let ws = ExtractWorkspace::new("usa_00017", codebook, "102\n");
    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .success();
    assert_eq!(ws.read_artifact("tsv"), "OCC\tN\nClergy \"ordained\"\t2\n");

    let single = "\
Variable   Columns   Len
X          1-2       2     Single
";
    let ws = ExtractWorkspace::new("usa_00018", single, "\n12\n");
    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .success();
    assert_eq!(ws.read_artifact("tsv"), "X\n\n12\n");
}

#[test]
fn convert_replaces_malformed_input_bytes_and_continues() {
    let ws = ExtractWorkspace::new("usa_00019", SIMPLE_CODEBOOK, "");
    ws.write_bytes("usa_00019.dat", b"0107\n0\xFF07\n0300\n");

    ipums_tsv()
        .args(["convert", &ws.base_str()])
        .assert()
        .success()
        .stderr(contains("Line 2 is not valid UTF-8").and(contains("Finished parsing 3 lines")));

    assert_eq!(
        ws.read_artifact("tsv"),
        "A\tAGE\n1\t7\n0\u{FFFD}\t7\n3\t0\n"
    );
}
