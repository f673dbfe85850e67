use std::fs;
use std::path::{Path, PathBuf};

use slitlamp_labeler::{FilterMode, LabelerConfig};
use tempfile::TempDir;

pub const CROSSWALK: &str = "\
maskedid,maskedid_studyid,proc_name,photo_name
1001,1001_1,SLIT LAMP,a.jpg
 1002 ,1002_1,SLIT LAMP,b.jpg
1003,1003_1,SLIT LAMP,c.jpg
1004,1004_1,SLIT LAMP,d.jpg
";

/// Patient ids are float-typed here and integer-typed in the notes
pub const DIAGNOSIS: &str = "\
maskedid_studyid,pat_mrn,exam_date,laterality,main_diagnosis
1001_1,500.0,2021-03-01,OD,Dry eye
1002_1,501,2021-03-10,OS,Cataract
1003_1,502,2021-04-01,OD,Keratitis
";

pub const NOTES: &str = "\
pat_mrn,note_id,note_date,note_text,ip_note_type
500,n1,2021-02-15,before exam,Progress Notes
500,n2,2021-03-05,after exam,Progress Notes
 501 ,n3,2021-03-12,follow up,Progress Notes
502,n4,2019-01-01,too old,Progress Notes
501,n5,2021-03-10,phone call,Telephone
";

pub const ANNOTATIONS: &str = "\
maskedid,annotation_date,examfield,value,laterality
1001,2021-03-03,Cornea,clear,OD
1001,2021-03-03,Lids,normal,OS
1003.0,2021-04-02,Conjunctiva,injected,OS
1002,2021-05-01,Cornea,haze,OD
";

/// Sources, cache, labels and users under one temporary directory
pub struct Fixture {
    pub dir: TempDir,
    pub config: LabelerConfig,
}

impl Fixture {
    /// Write the default sources and a config pointing at them
    #[must_use]
    pub fn new() -> Self {
        Self::with_sources(CROSSWALK, DIAGNOSIS, NOTES, ANNOTATIONS)
    }

    #[must_use]
    pub fn with_sources(crosswalk: &str, diagnosis: &str, notes: &str, annotations: &str) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path();
        let config = LabelerConfig {
            crosswalk_path: write(root, "crosswalk.csv", crosswalk),
            diagnosis_path: write(root, "diagnosis.csv", diagnosis),
            notes_path: write(root, "notes.csv", notes),
            annotations_path: write(root, "annotations.csv", annotations),
            image_base_path: root.join("images"),
            cache_path: Some(root.join("preprocessed.parquet")),
            use_cache: true,
            labels_dir: root.join("labels"),
            users_file: root.join("users").join("users.json"),
            default_filter: FilterMode::All,
            ..LabelerConfig::default()
        };
        Self { dir, config }
    }

    /// Config with a different start filter
    #[must_use]
    pub fn config_with(&self, filter: FilterMode) -> LabelerConfig {
        LabelerConfig {
            default_filter: filter,
            ..self.config.clone()
        }
    }

    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.config
            .cache_path
            .clone()
            .expect("fixture always sets a cache path")
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

fn write(root: &Path, name: &str, content: &str) -> PathBuf {
    let path = root.join(name);
    fs::write(&path, content).expect("write fixture source");
    path
}
