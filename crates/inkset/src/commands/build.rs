//! `inkset build` command implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use inkset_cache::{Cache, CacheBucket, FileCache};
use inkset_config::{CliSettings, Config};
use inkset_diagrams::{
    CACHE_BUCKET, CommandRenderer, DiagramPipeline, PageContext, PrepareStats, RenderQueue,
    TracingLogger,
};
use tokio::task::JoinSet;

use crate::error::CliError;
use crate::output::Output;
use crate::page::{SourcePage, html_document, render_markdown};

/// Arguments for the build command.
#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Markdown documents to render.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory (default: next to each input).
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Path to configuration file (default: auto-discover inkset.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory (overrides config).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Process documents without `diagrams: true` in their front matter.
    #[arg(long)]
    every_page: bool,

    /// Scale for blocks with a bare `-scale` modifier (overrides config).
    #[arg(long)]
    scale: Option<f64>,

    /// Renderer command line, split on whitespace (overrides config).
    #[arg(long, env = "INKSET_RENDERER")]
    renderer: Option<String>,

    /// Also write an index.html aggregating every document.
    #[arg(long)]
    index: bool,

    /// Enable verbose output (renderer diagnostics and info logs).
    #[arg(short, long)]
    pub verbose: bool,
}

/// One document after the early pass and markdown rendering.
struct RenderedDocument {
    input: PathBuf,
    title: String,
    html: String,
    has_diagrams: bool,
    stats: PrepareStats,
}

impl BuildArgs {
    /// Execute the build command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails, an input cannot be read, or an
    /// output cannot be written. Diagram render failures are reported but do
    /// not fail the build.
    pub(crate) async fn execute(self, version: &str) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            cache_dir: self.cache_dir.clone(),
            every_page: self.every_page.then_some(true),
            scale: self.scale,
            renderer_command: self
                .renderer
                .as_deref()
                .map(|cmd| cmd.split_whitespace().map(str::to_owned).collect()),
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let command = config.require_renderer_command()?;
        let renderer = CommandRenderer::from_command(command)
            .ok_or_else(|| CliError::Build("renderer command is empty".to_owned()))?;

        let cache = FileCache::open(config.cache_resolved.dir.clone(), version);
        output.info(&format!("Cache: {}", cache.root().display()));
        let bucket: Arc<dyn CacheBucket> = Arc::from(cache.bucket(CACHE_BUCKET));

        let queue = Arc::new(RenderQueue::create(Arc::new(TracingLogger)));
        let pipeline = Arc::new(
            DiagramPipeline::new(
                config.diagrams.clone(),
                bucket,
                Arc::new(renderer),
                Arc::clone(&queue),
            )
            .verbose(self.verbose),
        );

        let documents = render_documents(&self.inputs, &pipeline).await;
        // Every render has been awaited by now; this only closes the worker.
        queue.drain().await;
        let documents = documents?;

        if let Some(dir) = &self.out_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut totals = PrepareStats::default();
        for doc in &documents {
            let page = PageContext {
                has_diagrams: doc.has_diagrams,
                aggregates_diagrams: false,
            };
            let html = pipeline.finish(html_document(&doc.title, &doc.html), page);
            let path = output_path(&doc.input, self.out_dir.as_deref());
            tokio::fs::write(&path, html).await?;
            tracing::info!(path = %path.display(), "wrote document");

            totals.rendered += doc.stats.rendered;
            totals.cached += doc.stats.cached;
            totals.failed += doc.stats.failed;
        }

        if self.index {
            let path = index_path(&self.inputs, self.out_dir.as_deref());
            tokio::fs::write(&path, build_index(&pipeline, &documents)).await?;
            output.info(&format!("Index: {}", path.display()));
        }

        output.build_summary(documents.len(), &totals);
        Ok(())
    }
}

/// Run the early pass and markdown rendering for every input concurrently.
///
/// Diagram renders still go through the shared queue one at a time.
async fn render_documents(
    inputs: &[PathBuf],
    pipeline: &Arc<DiagramPipeline>,
) -> Result<Vec<RenderedDocument>, CliError> {
    let mut tasks = JoinSet::new();
    for (index, input) in inputs.iter().enumerate() {
        let pipeline = Arc::clone(pipeline);
        let input = input.clone();
        tasks.spawn(async move { (index, render_document(input, &pipeline).await) });
    }

    let mut documents = Vec::with_capacity(inputs.len());
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| CliError::Build(e.to_string()))?;
        documents.push((index, result?));
    }
    documents.sort_by_key(|(index, _)| *index);
    Ok(documents.into_iter().map(|(_, doc)| doc).collect())
}

async fn render_document(
    input: PathBuf,
    pipeline: &DiagramPipeline,
) -> Result<RenderedDocument, CliError> {
    let content = tokio::fs::read_to_string(&input)
        .await
        .map_err(|source| CliError::Read {
            path: input.clone(),
            source,
        })?;
    let page = SourcePage::parse(&content).map_err(|source| CliError::FrontMatter {
        path: input.clone(),
        source,
    })?;

    let prepared = pipeline.prepare(page.body, page.meta.diagrams).await;
    tracing::debug!(
        path = %input.display(),
        diagrams = prepared.diagrams.len(),
        "prepared document"
    );

    let title = page.meta.title.unwrap_or_else(|| file_stem(&input));
    Ok(RenderedDocument {
        html: render_markdown(&prepared.content),
        has_diagrams: prepared.has_diagrams(),
        stats: prepared.stats,
        title,
        input,
    })
}

fn build_index(pipeline: &DiagramPipeline, documents: &[RenderedDocument]) -> String {
    let body: String = documents
        .iter()
        .map(|doc| format!("<article>\n{}</article>\n", doc.html))
        .collect();
    let page = PageContext {
        has_diagrams: false,
        aggregates_diagrams: documents.iter().any(|doc| doc.has_diagrams),
    };
    pipeline.finish(html_document("Index", &body), page)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// `{out_dir}/{stem}.html`, or next to the input without an output directory.
fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let dir = out_dir
        .or_else(|| input.parent())
        .unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}.html", file_stem(input)))
}

fn index_path(inputs: &[PathBuf], out_dir: Option<&Path>) -> PathBuf {
    let dir = out_dir
        .or_else(|| inputs.first().and_then(|input| input.parent()))
        .unwrap_or_else(|| Path::new("."));
    dir.join("index.html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_output_path_next_to_input() {
        assert_eq!(
            output_path(Path::new("docs/post.md"), None),
            PathBuf::from("docs/post.html")
        );
    }

    #[test]
    fn test_output_path_in_out_dir() {
        assert_eq!(
            output_path(Path::new("docs/v1.2.md"), Some(Path::new("site"))),
            PathBuf::from("site/v1.2.html")
        );
    }

    #[test]
    fn test_index_path() {
        let inputs = vec![PathBuf::from("docs/a.md"), PathBuf::from("b.md")];

        assert_eq!(index_path(&inputs, None), PathBuf::from("docs/index.html"));
        assert_eq!(
            index_path(&inputs, Some(Path::new("out"))),
            PathBuf::from("out/index.html")
        );
    }

    #[cfg(unix)]
    mod build {
        use std::fs;

        use tempfile::TempDir;

        use super::*;
        use pretty_assertions::assert_eq;

        const CONFIG: &str = r#"
[diagrams]
inline_style = ".tikz svg { max-width: 100% }"

[renderer]
command = ["sh", "-c", '''cat >/dev/null; echo '<svg width="4" height="2" viewBox="0 0 4 2"><path/></svg>' ''']

[cache]
dir = ".cache"
"#;

        fn args(dir: &Path, inputs: Vec<PathBuf>) -> BuildArgs {
            BuildArgs {
                inputs,
                out_dir: Some(dir.join("out")),
                config: Some(dir.join("inkset.toml")),
                cache_dir: None,
                every_page: false,
                scale: None,
                renderer: None,
                index: true,
                verbose: false,
            }
        }

        #[tokio::test]
        async fn test_build_renders_opted_in_documents() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("inkset.toml"), CONFIG).unwrap();
            let with = dir.path().join("with.md");
            let without = dir.path().join("without.md");
            fs::write(
                &with,
                "---\ntitle: Shapes\ndiagrams: true\n---\n\n# Shapes\n\n```tikz-scale=2\n\\draw (0,0) rectangle (4,2);\n```\n",
            )
            .unwrap();
            fs::write(&without, "# Plain\n\n```tikz\n\\draw (0,0);\n```\n").unwrap();

            args(dir.path(), vec![with, without])
                .execute("test")
                .await
                .unwrap();

            let out = dir.path().join("out");
            let with_html = fs::read_to_string(out.join("with.html")).unwrap();
            assert!(with_html.contains("<title>Shapes</title>"));
            assert!(with_html.contains(r#"<p><span class="tikz"><svg width="8.000" height="4.000""#));
            assert!(with_html.contains("<style>.tikz svg { max-width: 100% }</style></head>"));

            let without_html = fs::read_to_string(out.join("without.html")).unwrap();
            assert!(!without_html.contains("<svg"));
            assert!(!without_html.contains("fonts.css"));
            assert!(without_html.contains("\\draw (0,0);"));

            let index = fs::read_to_string(out.join("index.html")).unwrap();
            assert_eq!(index.matches("<article>").count(), 2);
            assert_eq!(index.matches("<svg").count(), 1);
            assert!(index.contains("fonts.css"));

            let cached = fs::read_dir(dir.path().join(".cache").join("diagrams"))
                .unwrap()
                .count();
            assert_eq!(cached, 1);
        }

        #[tokio::test]
        async fn test_build_missing_input_fails() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("inkset.toml"), CONFIG).unwrap();

            let err = args(dir.path(), vec![dir.path().join("missing.md")])
                .execute("test")
                .await
                .unwrap_err();

            assert!(matches!(err, CliError::Read { .. }));
        }

        #[tokio::test]
        async fn test_build_requires_renderer() {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("inkset.toml"), "[diagrams]\n").unwrap();
            let input = dir.path().join("a.md");
            fs::write(&input, "# A\n").unwrap();

            let err = args(dir.path(), vec![input])
                .execute("test")
                .await
                .unwrap_err();

            assert!(matches!(err, CliError::Config(_)));
        }
    }
}
