use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};

use crate::cli::{output, Cli};
use crate::export::sink::{git_checkout, git_init, GitImportSink, StreamSink};
use crate::export::{AnnotateOptions, ExportOptions, RevisionMerger, StreamExporter};
use crate::mediawiki::{ApiClient, ApiRevisionSource, RevisionSource, Site, TimeWindow};
use crate::utils::sanitize_filename;

pub fn run(cli: Cli) -> Result<()> {
    let site = resolve_site(&cli)?;
    let client = ApiClient::new(site.clone())?;
    output::connection_banner(&site);

    for article in &cli.articles {
        if !client
            .page_exists(article)
            .with_context(|| format!("checking article `{}`", article))?
        {
            bail!("article `{}` does not exist on {}", article, site.host);
        }
    }

    let window = TimeWindow {
        since: cli.since.map(start_of_day),
        until: cli.until.map(end_of_day),
    };
    let sources: Vec<Box<dyn RevisionSource>> = cli
        .articles
        .iter()
        .map(|article| {
            Box::new(ApiRevisionSource::new(client.clone(), article.clone(), window))
                as Box<dyn RevisionSource>
        })
        .collect();
    let mut merger = RevisionMerger::new(sources);

    let options = ExportOptions {
        branch: cli.branch.clone(),
        annotate: AnnotateOptions {
            rewrite_refs: cli.rewrite_refs,
            denoise: cli.denoise,
        },
        verify: cli.verify,
    };

    let mut exported = 0usize;
    if cli.no_import {
        let destination = run_stream(&cli, site, options, &mut merger, &mut exported)?;
        output::done(exported, &destination);
    } else {
        let destination = run_import(&cli, site, options, &mut merger, &mut exported)?;
        output::done(exported, &destination);
    }
    Ok(())
}

/// Where the `-n` stream goes: stdout unless an explicit path was given
#[derive(Debug, PartialEq, Eq)]
enum StreamTarget {
    Stdout,
    File(PathBuf),
}

fn stream_target(out: Option<&Path>) -> StreamTarget {
    match out {
        None => StreamTarget::Stdout,
        Some(path) if path.as_os_str() == "-" => StreamTarget::Stdout,
        Some(path) => StreamTarget::File(path.to_path_buf()),
    }
}

fn create_stream_file(path: &Path) -> Result<File> {
    if path.exists() {
        bail!("output path `{}` already exists", path.display());
    }
    File::create(path).with_context(|| format!("creating `{}`", path.display()))
}

fn create_repo_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        bail!("output path `{}` already exists", dir.display());
    }
    fs::create_dir_all(dir).with_context(|| format!("creating `{}`", dir.display()))
}

/// `-n` mode: serialize the stream to stdout or a file without importing
fn run_stream(
    cli: &Cli,
    site: Site,
    options: ExportOptions,
    merger: &mut RevisionMerger,
    exported: &mut usize,
) -> Result<String> {
    let (target, label): (Box<dyn Write>, String) = match stream_target(cli.out.as_deref()) {
        StreamTarget::Stdout => (Box::new(io::stdout()), "stdout".to_string()),
        StreamTarget::File(path) => {
            let file = create_stream_file(&path)?;
            (Box::new(file), path.display().to_string())
        }
    };

    let mut exporter = StreamExporter::new(StreamSink::new(target), site, options);
    exporter.export(merger, |revision| {
        output::progress(revision);
        *exported += 1;
    })?;
    exporter.into_sink().into_inner().flush()?;
    Ok(label)
}

/// Default mode: initialize a repository and pipe the stream into
/// `git fast-import`, then check out the result for non-bare repos
fn run_import(
    cli: &Cli,
    site: Site,
    options: ExportOptions,
    merger: &mut RevisionMerger,
    exported: &mut usize,
) -> Result<String> {
    let dir = cli.out.clone().unwrap_or_else(|| default_out(cli));
    create_repo_dir(&dir)?;

    git_init(&dir, cli.bare, &cli.branch)?;
    let sink = GitImportSink::spawn(&dir)?;

    let mut exporter = StreamExporter::new(sink, site, options);
    exporter.export(merger, |revision| {
        output::progress(revision);
        *exported += 1;
    })?;
    exporter.into_sink().finish()?;

    if !cli.bare {
        git_checkout(&dir, &cli.branch)?;
    }
    Ok(dir.display().to_string())
}

fn resolve_site(cli: &Cli) -> Result<Site> {
    match (&cli.site, &cli.lang) {
        (Some(url), _) => Site::from_url(url),
        (None, Some(lang)) => Ok(Site::from_lang(lang)),
        (None, None) => Ok(Site::from_lang(&crate::utils::default_lang())),
    }
}

/// wp-style default output name: the first article's sanitized title
fn default_out(cli: &Cli) -> PathBuf {
    PathBuf::from(sanitize_filename(&cli.articles[0]))
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
        .and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    // Inclusive upper bound: the whole named day counts.
    date.and_hms_opt(23, 59, 59)
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN))
        .and_utc()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_stream_defaults_to_stdout() {
        assert_eq!(stream_target(None), StreamTarget::Stdout);
        assert_eq!(stream_target(Some(Path::new("-"))), StreamTarget::Stdout);
        assert_eq!(
            stream_target(Some(Path::new("history.fi"))),
            StreamTarget::File(PathBuf::from("history.fi"))
        );
    }

    #[test]
    fn test_existing_stream_file_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out");
        fs::write(&path, "taken").unwrap();

        let err = create_stream_file(&path).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "taken");
    }

    #[test]
    fn test_fresh_stream_file_is_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out");

        create_stream_file(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_existing_repo_dir_is_refused() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("Article");
        fs::create_dir(&repo).unwrap();

        let err = create_repo_dir(&repo).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_fresh_repo_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let repo = dir.path().join("Article");

        create_repo_dir(&repo).unwrap();
        assert!(repo.is_dir());
    }
}
