//! Filename classification and destination layout
//!
//! Classification is a pure function of the file name and the configured
//! pattern and template. It never touches the filesystem; collision handling
//! lives in [`crate::resolver`].

use ingest_types::{ClassifiedFile, ClipIdentity, EngineSettings, Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Number of capture groups a classification pattern must have
pub const CAPTURE_GROUPS: usize = 4;

/// Maps file names to clip identities and organised destinations
#[derive(Debug, Clone)]
pub struct Classifier {
    pattern: Regex,
    folder_template: String,
    unmatched_folder: String,
    destination_root: PathBuf,
}

impl Classifier {
    /// Compile the classifier from engine settings
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        if settings.pattern.trim().is_empty() {
            return Err(Error::pattern("pattern is empty"));
        }
        let pattern = Regex::new(&settings.pattern).map_err(|e| Error::pattern(e.to_string()))?;
        let groups = pattern.captures_len() - 1;
        if groups != CAPTURE_GROUPS {
            return Err(Error::pattern(format!(
                "expected {} capture groups, found {}",
                CAPTURE_GROUPS, groups
            )));
        }

        Ok(Self {
            pattern,
            folder_template: settings.folder_template.clone(),
            unmatched_folder: settings.unmatched_folder.clone(),
            destination_root: settings.destination_root.clone(),
        })
    }

    /// Root every destination is resolved under
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }

    /// Classify the file at `path` by its base name
    ///
    /// The extension is whatever follows the last dot of the base name, as
    /// [`Path::extension`] reports it; a leading dot does not start one.
    pub fn classify(&self, path: &Path) -> ClassifiedFile {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (stem, extension) = split_extension(&file_name);

        let identity = self.pattern.captures(stem).map(|caps| {
            let group = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();
            ClipIdentity {
                project: group(1),
                client: group(2),
                camera: group(3),
                clip: group(4),
            }
        });

        ClassifiedFile {
            original_path: path.to_path_buf(),
            extension: extension.to_string(),
            file_name,
            identity,
        }
    }

    /// Directory a classified file belongs in
    pub fn destination_dir(&self, file: &ClassifiedFile) -> PathBuf {
        match &file.identity {
            Some(identity) => {
                let relative = self
                    .folder_template
                    .replace("{client}", &identity.client)
                    .replace("{project}", &identity.project)
                    .replace("{camera}", &identity.camera);
                self.destination_root.join(relative)
            }
            None => self.destination_root.join(&self.unmatched_folder),
        }
    }

    /// Full destination path before collision handling
    ///
    /// Matched files are renamed to the clip token plus the original
    /// extension; unmatched files keep their name byte for byte.
    pub fn destination_path(&self, file: &ClassifiedFile) -> PathBuf {
        let dir = self.destination_dir(file);
        match &file.identity {
            Some(identity) => dir.join(format!("{}{}", identity.clip, file.extension)),
            None => match file.original_path.file_name() {
                Some(name) => dir.join(name),
                None => dir.join(&file.file_name),
            },
        }
    }
}

/// Split a base name into stem and extension (with its dot)
pub fn split_extension(file_name: &str) -> (&str, &str) {
    match Path::new(file_name).extension() {
        Some(ext) => {
            let dot = file_name.len() - ext.len() - 1;
            (&file_name[..dot], &file_name[dot..])
        }
        None => (file_name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const CAMERA_PATTERN: &str = r"^([^_]+)_([^_]+)_(ACam|BCam|CCam)_(.+)$";

    fn classifier() -> Classifier {
        let mut settings = EngineSettings::new("/mnt/storage");
        settings.pattern = CAMERA_PATTERN.to_string();
        Classifier::new(&settings).unwrap()
    }

    #[rstest]
    #[case("BrandVideo_Nike_ACam_001.mp4", "/mnt/storage/Nike/BrandVideo/ACam/001.mp4")]
    #[case("Interview_Tesla_CCam_Take5.mxf", "/mnt/storage/Tesla/Interview/CCam/Take5.mxf")]
    #[case("random_video.mp4", "/mnt/storage/Unsorted/random_video.mp4")]
    #[case("Promo_Acme_BCam_A_B_C.MOV", "/mnt/storage/Acme/Promo/BCam/A_B_C.MOV")]
    #[case("Promo_Acme_DCam_001.mp4", "/mnt/storage/Unsorted/Promo_Acme_DCam_001.mp4")]
    fn test_destination_paths(#[case] name: &str, #[case] expected: &str) {
        let classifier = classifier();
        let file = classifier.classify(&Path::new("/media/card/DCIM").join(name));
        assert_eq!(classifier.destination_path(&file), PathBuf::from(expected));
    }

    #[test]
    fn test_identity_tokens() {
        let file = classifier().classify(Path::new("/card/BrandVideo_Nike_ACam_001.mp4"));
        assert!(file.is_matched());
        assert_eq!(file.extension, ".mp4");
        assert_eq!(
            file.identity,
            Some(ClipIdentity {
                project: "BrandVideo".to_string(),
                client: "Nike".to_string(),
                camera: "ACam".to_string(),
                clip: "001".to_string(),
            })
        );
    }

    #[rstest]
    #[case("clip.tar.gz", "clip.tar", ".gz")]
    #[case("Take5", "Take5", "")]
    #[case(".hidden", ".hidden", "")]
    #[case("trailing.", "trailing", ".")]
    fn test_split_extension(#[case] name: &str, #[case] stem: &str, #[case] ext: &str) {
        assert_eq!(split_extension(name), (stem, ext));
    }

    #[rstest]
    #[case("")]
    #[case("^(a)_(b)_(c)$")]
    #[case("^(a)_(b)_(c)_(d)_(e)$")]
    #[case("^(unclosed")]
    fn test_rejects_unusable_patterns(#[case] pattern: &str) {
        let mut settings = EngineSettings::new("/mnt/storage");
        settings.pattern = pattern.to_string();
        assert!(matches!(
            Classifier::new(&settings),
            Err(Error::Pattern { .. })
        ));
    }

    #[test]
    fn test_optional_group_counts_as_empty() {
        let mut settings = EngineSettings::new("/mnt/storage");
        settings.pattern = r"^([^_]+)_([^_]+)_(ACam)?_?(.+)$".to_string();
        let classifier = Classifier::new(&settings).unwrap();

        let file = classifier.classify(Path::new("Spot_Acme_001.mp4"));
        let identity = file.identity.clone().unwrap();
        assert_eq!(identity.camera, "");
        assert_eq!(
            classifier.destination_path(&file),
            PathBuf::from("/mnt/storage/Acme/Spot/001.mp4")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unmatched_name_keeps_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let classifier = classifier();
        let name = OsStr::from_bytes(b"clip\xff.mp4");
        let file = classifier.classify(&Path::new("/media/card").join(name));

        assert!(!file.is_matched());
        assert_eq!(
            classifier.destination_path(&file),
            Path::new("/mnt/storage/Unsorted").join(name)
        );
    }

    proptest! {
        #[test]
        fn test_matching_names_yield_four_tokens(
            project in "[A-Za-z0-9]{1,12}",
            client in "[A-Za-z0-9]{1,12}",
            camera in prop::sample::select(vec!["ACam", "BCam", "CCam"]),
            clip in "[A-Za-z0-9_]{1,12}",
            ext in "[a-z0-9]{1,4}",
        ) {
            let classifier = classifier();
            let name = format!("{}_{}_{}_{}.{}", project, client, camera, clip, ext);
            let file = classifier.classify(Path::new(&name));

            let identity = file.identity.clone().unwrap();
            prop_assert_eq!(&identity.project, &project);
            prop_assert_eq!(&identity.client, &client);
            prop_assert_eq!(identity.camera.as_str(), camera);
            prop_assert_eq!(&identity.clip, &clip);

            let expected = PathBuf::from("/mnt/storage")
                .join(&client)
                .join(&project)
                .join(camera)
                .join(format!("{}.{}", clip, ext));
            prop_assert_eq!(classifier.destination_path(&file), expected.clone());
            // Deterministic for the same input
            prop_assert_eq!(classifier.destination_path(&classifier.classify(Path::new(&name))), expected);
        }

        #[test]
        fn test_non_matching_names_go_to_fallback(name in "[A-Za-z0-9]{1,20}(\\.[a-z0-9]{1,4})?") {
            let classifier = classifier();
            let file = classifier.classify(Path::new(&name));

            prop_assert!(!file.is_matched());
            prop_assert_eq!(
                classifier.destination_path(&file),
                PathBuf::from("/mnt/storage/Unsorted").join(&name)
            );
        }
    }
}
