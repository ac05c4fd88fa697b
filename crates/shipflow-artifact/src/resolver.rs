//! 依存タスクのアーティファクト解決

use crate::error::{ArtifactError, Result};
use crate::queue::{TaskArtifact, TaskQueue};
use glob::{MatchOptions, Pattern};
use tracing::info;

/// シェルの fnmatch と同じく `*` が `/` にもマッチする
const FNMATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// fnmatch 形式のフィルタ
#[derive(Debug, Clone)]
pub struct ArtifactFilter {
    source: String,
    pattern: Pattern,
}

impl ArtifactFilter {
    /// `**` は `*` と同じ意味として扱う
    pub fn new(filter: &str) -> Result<Self> {
        let mut normalized = filter.to_string();
        while normalized.contains("**") {
            normalized = normalized.replace("**", "*");
        }

        let pattern = Pattern::new(&normalized).map_err(|e| ArtifactError::InvalidFilter {
            filter: filter.to_string(),
            message: e.msg.to_string(),
        })?;
        Ok(Self {
            source: filter.to_string(),
            pattern,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.matches_with(name, FNMATCH)
    }
}

pub struct ArtifactResolver<'a> {
    queue: &'a dyn TaskQueue,
}

impl<'a> ArtifactResolver<'a> {
    pub fn new(queue: &'a dyn TaskQueue) -> Self {
        Self { queue }
    }

    /// ルートタスクの依存タスクから、フィルタに一致するアーティファクトを集める
    ///
    /// 順序は依存の宣言順、その中は一覧の順。
    #[tracing::instrument(skip(self))]
    pub async fn resolve(
        &self,
        root_task_id: &str,
        include: &str,
        exclude: Option<&str>,
    ) -> Result<Vec<TaskArtifact>> {
        let include = ArtifactFilter::new(include)?;
        let exclude = exclude.map(ArtifactFilter::new).transpose()?;

        info!("Loading task status {}", root_task_id);
        let dependencies = self.queue.task_dependencies(root_task_id).await?;
        if dependencies.is_empty() {
            return Err(ArtifactError::NoDependencies(root_task_id.to_string()));
        }

        let mut matching = Vec::new();
        for (i, task_id) in dependencies.iter().enumerate() {
            info!(
                "Loading task dependencies {}/{} {}",
                i + 1,
                dependencies.len(),
                task_id
            );

            for name in self.list_all_artifacts(task_id).await? {
                if !include.matches(&name) {
                    continue;
                }
                if let Some(exclude) = &exclude
                    && exclude.matches(&name)
                {
                    info!("Excluding artifact {} because of exclude filter", name);
                    continue;
                }
                matching.push(TaskArtifact::new(task_id.as_str(), name));
            }
        }

        Ok(matching)
    }

    /// 一致するアーティファクトがちょうど1つであることを要求する
    pub async fn resolve_exactly_one(
        &self,
        root_task_id: &str,
        filter: &str,
    ) -> Result<TaskArtifact> {
        let mut matching = self.resolve(root_task_id, filter, None).await?;
        match matching.len() {
            0 => Err(ArtifactError::NotFound {
                filter: filter.to_string(),
            }),
            1 => Ok(matching.remove(0)),
            _ => Err(ArtifactError::Ambiguous {
                filter: filter.to_string(),
                matches: matching
                    .into_iter()
                    .map(|a| format!("{}/{}", a.task_id, a.name))
                    .collect(),
            }),
        }
    }

    async fn list_all_artifacts(&self, task_id: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = self
                .queue
                .list_latest_artifacts(task_id, token.as_deref())
                .await?;
            names.extend(page.names);
            match page.continuation_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::queue::ArtifactPage;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// メモリ上のタスクグラフ
    #[derive(Default)]
    pub(crate) struct MockQueue {
        pub dependencies: HashMap<String, Vec<String>>,
        /// (task_id, continuation_token) ごとのページ
        pub pages: HashMap<(String, Option<String>), ArtifactPage>,
        pub base_url: String,
    }

    impl MockQueue {
        pub fn with_task(mut self, root: &str, deps: &[&str]) -> Self {
            self.dependencies
                .insert(root.to_string(), deps.iter().map(|d| d.to_string()).collect());
            self
        }

        pub fn with_artifacts(self, task_id: &str, names: &[&str]) -> Self {
            self.with_page(task_id, None, names, None)
        }

        pub fn with_page(
            mut self,
            task_id: &str,
            token: Option<&str>,
            names: &[&str],
            next: Option<&str>,
        ) -> Self {
            self.pages.insert(
                (task_id.to_string(), token.map(str::to_string)),
                ArtifactPage {
                    names: names.iter().map(|n| n.to_string()).collect(),
                    continuation_token: next.map(str::to_string),
                },
            );
            self
        }
    }

    #[async_trait]
    impl TaskQueue for MockQueue {
        async fn task_dependencies(&self, task_id: &str) -> Result<Vec<String>> {
            Ok(self.dependencies.get(task_id).cloned().unwrap_or_default())
        }

        async fn list_latest_artifacts(
            &self,
            task_id: &str,
            continuation_token: Option<&str>,
        ) -> Result<ArtifactPage> {
            Ok(self
                .pages
                .get(&(task_id.to_string(), continuation_token.map(str::to_string)))
                .cloned()
                .unwrap_or_default())
        }

        fn artifact_url(&self, task_id: &str, name: &str) -> Result<String> {
            Ok(format!("{}/{}/{}", self.base_url, task_id, name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockQueue;
    use super::*;

    fn queue() -> MockQueue {
        MockQueue::default()
            .with_task("root", &["dep1", "dep2"])
            .with_artifacts(
                "dep1",
                &["public/web.tar.zst", "public/logs/live.log", "public/worker.tar.zst"],
            )
            .with_artifacts("dep2", &["public/build/api.tar.zst", "private/secret.tar.zst"])
    }

    #[test]
    fn test_filter_fnmatch_semantics() {
        let filter = ArtifactFilter::new("public/**.tar.zst").unwrap();
        assert!(filter.matches("public/web.tar.zst"));
        assert!(filter.matches("public/build/api.tar.zst"));
        assert!(!filter.matches("private/secret.tar.zst"));

        let single = ArtifactFilter::new("public/?eb.tar.zst").unwrap();
        assert!(single.matches("public/web.tar.zst"));

        let class = ArtifactFilter::new("public/[wx]*.tar.zst").unwrap();
        assert!(class.matches("public/worker.tar.zst"));
        assert!(!class.matches("public/build/api.tar.zst"));
    }

    #[test]
    fn test_invalid_filter() {
        assert!(matches!(
            ArtifactFilter::new("public/[.tar"),
            Err(ArtifactError::InvalidFilter { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_in_dependency_order() {
        let queue = queue();
        let resolver = ArtifactResolver::new(&queue);

        let found = resolver
            .resolve("root", "public/**.tar.zst", None)
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![
                TaskArtifact::new("dep1", "public/web.tar.zst"),
                TaskArtifact::new("dep1", "public/worker.tar.zst"),
                TaskArtifact::new("dep2", "public/build/api.tar.zst"),
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_with_exclude() {
        let queue = queue();
        let resolver = ArtifactResolver::new(&queue);

        let found = resolver
            .resolve("root", "public/*.tar.zst", Some("public/build/*"))
            .await
            .unwrap();
        let names: Vec<&str> = found.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["public/web.tar.zst", "public/worker.tar.zst"]);
    }

    #[tokio::test]
    async fn test_resolve_follows_continuation() {
        let queue = MockQueue::default()
            .with_task("root", &["dep"])
            .with_page("dep", None, &["public/a.tar"], Some("t1"))
            .with_page("dep", Some("t1"), &["public/b.tar"], None);
        let resolver = ArtifactResolver::new(&queue);

        let found = resolver.resolve("root", "*.tar", None).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].name, "public/b.tar");
    }

    #[tokio::test]
    async fn test_no_dependencies() {
        let queue = MockQueue::default().with_task("root", &[]);
        let resolver = ArtifactResolver::new(&queue);

        assert!(matches!(
            resolver.resolve("root", "*", None).await,
            Err(ArtifactError::NoDependencies(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_exactly_one() {
        let queue = queue();
        let resolver = ArtifactResolver::new(&queue);

        let one = resolver
            .resolve_exactly_one("root", "public/web.tar.zst")
            .await
            .unwrap();
        assert_eq!(one, TaskArtifact::new("dep1", "public/web.tar.zst"));

        assert!(matches!(
            resolver.resolve_exactly_one("root", "public/missing.tar").await,
            Err(ArtifactError::NotFound { .. })
        ));

        match resolver.resolve_exactly_one("root", "public/w*").await {
            Err(ArtifactError::Ambiguous { matches, .. }) => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguous match, got {:?}", other),
        }
    }
}
