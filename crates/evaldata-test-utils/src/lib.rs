//! Testing utilities for evaldata workspace
//!
//! Sample raw files and helpers writing them into temp directories.

#![allow(missing_docs)]

use evaldata_scan::ScanNumber;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// SPEC file with a file header and four scans:
/// 1 plain, 2 aborted and resumed, 3 aborted for good, 4 with MCA spectra
pub const SPEC_FILE: &str = "\
#F sample.spec
#E 1559824701
#D Thu Jun 06 14:38:21 2019
#O0 Two Theta  Theta  Chi
#O1 Phi

#S 1  ascan  th 0 1 2 1
#D Thu Jun 06 14:38:21 2019
#T 1  (Seconds)
#P0 10.5 5.25 -3
#P1 90
#N 3
#L th  Monitor  Detector
0 1000 5
0.5 1001 7
1 999 6

#S 2  ascan  th 0 1 3 1
#D Thu Jun 06 14:40:02 2019
#T 1  (Seconds)
#P0 11 5.5 -3
#P1 90
#N 3
#L th  Monitor  Detector
0 1000 8
#C Thu Jun 06 14:40:10 2019.  Scan aborted after 1 points.
#C Thu Jun 06 14:40:30 2019.  Scan resumed.
0.33 1000 9
0.66 1002 10
1 1001 11

#S 3  ascan  th 0 1 4 1
#D Thu Jun 06 14:45:00 2019
#T 1  (Seconds)
#P0 12 6 -3
#P1 90
#N 3
#L th  Monitor  Detector
0 1000 12
0.25 1000 13
#C Thu Jun 06 14:45:20 2019.  Scan aborted after 2 points.

#S 4  timescan  1 0
#D Thu Jun 06 14:50:00 2019
#T 0.5  (Seconds)
#P0 12 6 -3
#P1 90
#@MCA 4C
#@CHANN 6 0 5 1
#N 2
#L Time  Counter
0 10
@A 1 2 3 4
5 6
0.5 20
@A 7 8 9 10
11 12
";

/// Scan appended to [`SPEC_FILE`] by [`append_spec_scan`]
pub const SPEC_APPENDIX: &str = "
#S 5  dscan  chi -1 1 2 1
#D Thu Jun 06 15:00:00 2019
#T 1  (Seconds)
#P0 12 6 -3
#P1 90
#N 2
#L chi  Detector
-1 100
1 200
";

/// PAL-XFEL meta log of one scan
#[must_use]
pub fn pal_meta_log(number: ScanNumber, points: usize) -> String {
    let mut text = format!(
        "#RUN {number}\n\
         #CMD delay scan -1 1 {points}\n\
         #TIM 2020-02-1{} 10:{:02}:00\n\
         #T 0.1\n\
         #MOT delay  thz\n\
         #VAL 0.5 {number}\n\
         #COL delay  Intensity  I0\n\
         #ATT 0.1\n",
        number % 10,
        number % 60
    );
    for i in 0..points {
        #[allow(clippy::cast_precision_loss)]
        let x = i as f64;
        text.push_str(&format!("{x} {} {}\n", x * 10.0 + f64::from(number), 100.0 + x));
    }
    text
}

/// Temp dir holding [`SPEC_FILE`] as `sample.spec`
pub struct SpecFixture {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl SpecFixture {
    /// Directory of the raw file
    #[must_use]
    pub fn dir_path(&self) -> &Path {
        self.dir.path()
    }
}

/// [`SPEC_FILE`] in a fresh temp dir
#[must_use]
pub fn spec_fixture() -> SpecFixture {
    spec_fixture_with(SPEC_FILE)
}

/// Custom SPEC content as `sample.spec` in a fresh temp dir
#[must_use]
pub fn spec_fixture_with(content: &str) -> SpecFixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.spec");
    std::fs::write(&path, content).unwrap();
    SpecFixture { dir, path }
}

/// Append [`SPEC_APPENDIX`]
pub fn append_spec_scan(path: &Path) {
    append_text(path, SPEC_APPENDIX);
}

/// Append text to a file
pub fn append_text(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

/// Temp dir with PAL-XFEL scan files `<n:07>_meta.log` in `scans/`
pub struct PalFixture {
    pub dir: TempDir,
    pub folder: PathBuf,
}

impl PalFixture {
    /// Add one more scan file
    pub fn add_scan(&self, number: ScanNumber, points: usize) {
        std::fs::write(
            self.folder.join(format!("{number:07}_meta.log")),
            pal_meta_log(number, points),
        )
        .unwrap();
    }
}

/// PAL-XFEL folder with three points per listed scan
#[must_use]
pub fn pal_fixture(numbers: &[ScanNumber]) -> PalFixture {
    let dir = tempfile::tempdir().unwrap();
    let folder = dir.path().join("scans");
    std::fs::create_dir(&folder).unwrap();
    let fixture = PalFixture { dir, folder };
    for &number in numbers {
        fixture.add_scan(number, 3);
    }
    fixture
}
