use std::path::{Path, PathBuf};

use euler_ledger_core::{Language, ProblemId, Toolchain};

/// Directory holding headers shared by every compiled solution.
pub const CPP_UTILS_DIR: &str = "pe_cpp_utils";

/// A solutions tree: `<root>/<language>/<problem>/problem_<problem>.<ext>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn language_dir(&self, language: Language) -> PathBuf {
        self.root.join(language.as_str())
    }

    /// Languages whose directory exists under the root, in [`Language::ALL`] order.
    #[must_use]
    pub fn detected_languages(&self) -> Vec<Language> {
        Language::ALL
            .into_iter()
            .filter(|language| self.language_dir(*language).is_dir())
            .collect()
    }

    #[must_use]
    pub fn problem_dir(&self, language: Language, problem: ProblemId) -> PathBuf {
        self.language_dir(language).join(problem.to_string())
    }

    #[must_use]
    pub fn solution_path(
        &self,
        language: Language,
        problem: ProblemId,
        toolchain: &Toolchain,
    ) -> PathBuf {
        self.problem_dir(language, problem)
            .join(solution_file_name(problem, toolchain.ext()))
    }

    /// The solution source if it exists as a regular file.
    #[must_use]
    pub fn locate(
        &self,
        language: Language,
        problem: ProblemId,
        toolchain: &Toolchain,
    ) -> Option<PathBuf> {
        let path = self.solution_path(language, problem, toolchain);
        path.is_file().then_some(path)
    }

    #[must_use]
    pub fn cpp_include_dir(&self) -> PathBuf {
        self.root.join(CPP_UTILS_DIR)
    }
}

#[must_use]
pub fn solution_file_name(problem: ProblemId, ext: &str) -> String {
    format!("problem_{problem}.{ext}")
}
