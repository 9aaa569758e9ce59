//! Command implementations for the Palisade CLI.

use std::sync::Arc;
use std::time::Instant;

use crate::cli::args::*;
use crate::cli::output::*;
use crate::chunk::ChunkMetadata;
use crate::embedding::{EmbeddingProvider, HashingEmbedder};
use crate::engine::{EngineConfig, QueryRequest, RetrievalEngine};
use crate::error::Result;
use crate::hybrid::HybridWeights;
use crate::namespace::NamespaceMetadata;

/// Execute a CLI command.
pub async fn execute_command(args: PalisadeArgs) -> Result<()> {
    let embedder = Arc::new(HashingEmbedder::new(args.dimension));
    let config = EngineConfig {
        dimension: args.dimension,
        ..Default::default()
    };
    let engine = RetrievalEngine::open(&args.data_dir, config, embedder.clone())?;

    match &args.command {
        Command::Create(create_args) => create_namespace(&engine, create_args, &args),
        Command::Delete(delete_args) => delete_namespace(&engine, delete_args, &args),
        Command::List(list_args) => list_namespaces(&engine, list_args, &args),
        Command::Details(details_args) => show_details(&engine, details_args, &args),
        Command::Index(index_args) => index_file(&engine, &*embedder, index_args, &args).await,
        Command::Query(query_args) => run_query(&engine, query_args, &args).await,
        Command::Clone(clone_args) => clone_namespace(&engine, clone_args, &args),
        Command::Migrate(migrate_args) => migrate_namespace(&engine, migrate_args, &args),
        Command::Backup(backup_args) => backup_namespace(&engine, backup_args, &args),
        Command::Restore(restore_args) => restore_namespace(&engine, restore_args, &args),
        Command::Overlap(overlap_args) => measure_overlap(&engine, overlap_args, &args),
        Command::Overview => show_overview(&engine, &args),
        Command::CacheStats => show_cache_stats(&engine, &args),
    }
}

fn create_namespace(
    engine: &RetrievalEngine,
    args: &CreateArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let metadata = NamespaceMetadata::new(args.name.as_str())
        .with_description(args.description.as_str())
        .with_department(args.department.as_str())
        .with_contact(args.contact.as_str())
        .with_tags(args.tags.clone());
    engine.create_namespace(metadata.clone())?;
    output_result(
        &format!("Created namespace '{}'", args.name),
        &metadata,
        cli_args,
    )
}

fn delete_namespace(
    engine: &RetrievalEngine,
    args: &DeleteArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    engine.delete_namespace(&args.name)?;
    output_result(
        &format!("Deleted namespace '{}'", args.name),
        &args.name,
        cli_args,
    )
}

fn list_namespaces(
    engine: &RetrievalEngine,
    args: &ListArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let names = match &args.department {
        Some(department) => engine.list_namespaces_by_department(department),
        None => engine.list_namespaces(),
    };

    if cli_args.output_format == OutputFormat::Human {
        for name in &names {
            println!("{name}");
        }
        Ok(())
    } else {
        output_result("", &names, cli_args)
    }
}

fn show_details(
    engine: &RetrievalEngine,
    args: &DetailsArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let stats = engine.namespace_stats(&args.name)?;
    if cli_args.output_format == OutputFormat::Human {
        println!("namespace:   {}", stats.metadata.name);
        if !stats.metadata.description.is_empty() {
            println!("description: {}", stats.metadata.description);
        }
        if !stats.metadata.department.is_empty() {
            println!("department:  {}", stats.metadata.department);
        }
        println!("documents:   {}", stats.doc_count);
        println!("chunks:      {}", stats.chunk_count);
        println!("terms:       {}", stats.term_count);
        println!("created:     {}", stats.metadata.created_at);
        println!("updated:     {}", stats.metadata.last_updated);
        Ok(())
    } else {
        output_result("", &stats, cli_args)
    }
}

async fn index_file(
    engine: &RetrievalEngine,
    embedder: &dyn EmbeddingProvider,
    args: &IndexArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let text = std::fs::read_to_string(&args.file)?;
    let source_filename = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.display().to_string());

    let start = Instant::now();
    let mut chunks_indexed = 0usize;
    for (chunk_index, paragraph) in text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .enumerate()
    {
        let embedding = embedder.embed(paragraph).await?;
        engine.index_chunk(
            &args.namespace,
            paragraph,
            embedding,
            ChunkMetadata::new(source_filename.as_str(), chunk_index as u32),
        )?;
        chunks_indexed += 1;
    }

    output_result(
        &format!("Indexed {chunks_indexed} chunks into '{}'", args.namespace),
        &IndexingResult {
            namespace: args.namespace.clone(),
            source_filename,
            chunks_indexed,
            duration_ms: start.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

async fn run_query(
    engine: &RetrievalEngine,
    args: &QueryArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let mut request = QueryRequest::across(args.namespaces.clone(), args.text.as_str())
        .top_k(args.top_k)
        .weights(HybridWeights::new(args.bm25_weight, args.vector_weight)?);
    if args.no_cache {
        request = request.bypass_cache();
    }

    let start = Instant::now();
    let hits = engine.search(request).await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    if cli_args.output_format == OutputFormat::Human {
        if hits.is_empty() {
            println!("No results.");
        }
        for (rank, hit) in hits.iter().enumerate() {
            println!(
                "{:2}. [{:.4}] {}/{} ({} #{})",
                rank + 1,
                hit.score,
                hit.namespace,
                hit.chunk_id,
                hit.source_filename,
                hit.chunk_index
            );
            if cli_args.verbosity() > 1 {
                println!("    bm25={:.4} vector={:.4}", hit.bm25_score, hit.vector_score);
                if !hit.keyword_matches.is_empty() {
                    println!("    matched: {}", hit.keyword_matches.join(", "));
                }
            }
            println!("    {}", snippet(&hit.text, 160));
        }
        if cli_args.verbosity() > 0 {
            println!("{} hits in {duration_ms} ms", hits.len());
        }
        Ok(())
    } else {
        let total_hits = hits.len();
        output_result(
            "",
            &QueryResults {
                hits,
                total_hits,
                duration_ms,
            },
            cli_args,
        )
    }
}

fn clone_namespace(
    engine: &RetrievalEngine,
    args: &CloneArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    engine.clone_namespace(&args.src, &args.dst)?;
    let stats = engine.namespace_stats(&args.dst)?;
    output_result(
        &format!("Cloned '{}' into '{}'", args.src, args.dst),
        &stats,
        cli_args,
    )
}

fn migrate_namespace(
    engine: &RetrievalEngine,
    args: &MigrateArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let moved = engine.migrate(&args.src, &args.dst, args.merge)?;
    output_result(
        &format!("Migrated {moved} chunks from '{}' to '{}'", args.src, args.dst),
        &moved,
        cli_args,
    )
}

fn backup_namespace(
    engine: &RetrievalEngine,
    args: &BackupArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let manifest = engine.backup(&args.namespace, &args.dest)?;
    output_result(
        &format!(
            "Backed up '{}' to {} (id {})",
            args.namespace,
            args.dest.display(),
            manifest.backup_id
        ),
        &manifest,
        cli_args,
    )
}

fn restore_namespace(
    engine: &RetrievalEngine,
    args: &RestoreArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let name = engine.restore(&args.backup_dir, args.overwrite)?;
    let stats = engine.namespace_stats(&name)?;
    output_result(&format!("Restored namespace '{name}'"), &stats, cli_args)
}

fn measure_overlap(
    engine: &RetrievalEngine,
    args: &OverlapArgs,
    cli_args: &PalisadeArgs,
) -> Result<()> {
    let report = engine.overlap(&args.namespace_a, &args.namespace_b, args.sample_size)?;
    if cli_args.output_format == OutputFormat::Human {
        println!(
            "overlap {} -> {} (sampled {} chunks)",
            report.namespace_a, report.namespace_b, report.sampled
        );
        println!("average similarity: {:.4}", report.average_similarity);
        println!("max similarity:     {:.4}", report.max_similarity);
        println!(
            "high overlap:       {} chunks ({:.1}%)",
            report.high_overlap_count, report.high_overlap_percentage
        );
        Ok(())
    } else {
        output_result("", &report, cli_args)
    }
}

fn show_overview(engine: &RetrievalEngine, cli_args: &PalisadeArgs) -> Result<()> {
    let overview = engine.system_overview();
    if cli_args.output_format == OutputFormat::Human {
        println!(
            "{} namespaces, {} documents, {} chunks",
            overview.namespace_count, overview.total_docs, overview.total_chunks
        );
        for stats in &overview.namespaces {
            println!(
                "  {:<24} {:>6} chunks  {:>5} docs",
                stats.metadata.name, stats.chunk_count, stats.doc_count
            );
        }
        Ok(())
    } else {
        output_result("", &overview, cli_args)
    }
}

fn show_cache_stats(engine: &RetrievalEngine, cli_args: &PalisadeArgs) -> Result<()> {
    let stats = engine.cache_stats();
    output_result(
        &format!(
            "hits {} / misses {} / bloom skips {} / entries {}",
            stats.hits, stats.misses, stats.bloom_skips, stats.entries
        ),
        &stats,
        cli_args,
    )
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= max_chars {
        flattened
    } else {
        let cut: String = flattened.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}
