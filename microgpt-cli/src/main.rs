use std::path::Path;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use log::{error, info, warn};
use microgpt_corpus::{Vocabulary, encode_corpus, load_corpus, sample_batch, split_tokens};
use microgpt_model::{
    GenerationConfig, LanguageModel, ModelConfig, Rng, load_checkpoint, run_session,
    save_checkpoint,
};

/// Define the export subcommand.
fn export_subcommand() -> Command {
    Command::new("export")
        .about("Build a vocabulary from a text corpus and write an initialized model checkpoint")
        .arg(
            Arg::new("CORPUS_PATH")
                .help("Path to the raw text corpus")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("OUTPUT_PATH")
                .help("Output path for the checkpoint (the vocabulary is written alongside as <OUTPUT>.vocab)")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON hyperparameter file; overrides the individual dimension flags"),
        )
        .arg(
            Arg::new("dim")
                .long("dim")
                .value_name("INT")
                .help("Embedding width")
                .default_value("384")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("layers")
                .long("layers")
                .value_name("INT")
                .help("Number of transformer blocks")
                .default_value("6")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("heads")
                .long("heads")
                .value_name("INT")
                .help("Attention heads per block; must evenly divide the embedding width")
                .default_value("6")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("INT")
                .help("Maximum context length")
                .default_value("64")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("dropout")
                .long("dropout")
                .value_name("FLOAT")
                .help("Stochastic masking rate in [0, 1); 0 keeps generation deterministic")
                .default_value("0.0")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .short('s')
                .value_name("INT")
                .help("Seed for parameter initialization")
                .default_value("42")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Define the generate subcommand.
fn generate_subcommand() -> Command {
    Command::new("generate")
        .about("Generate text from a model checkpoint")
        .arg(
            Arg::new("checkpoint")
                .help("Model checkpoint file (expects <checkpoint>.vocab alongside)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("temperature")
                .short('t')
                .long("temperature")
                .value_name("FLOAT")
                .help("Temperature for sampling in [0, inf], default 1.0")
                .default_value("1.0")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("topp")
                .short('p')
                .long("topp")
                .value_name("FLOAT")
                .help("Top-p for nucleus sampling in [0,1], default 0.9")
                .default_value("0.9")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_name("INT")
                .help("Random seed")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("context")
                .short('c')
                .long("context")
                .value_name("INT")
                .help("Context window size, (default) = checkpoint block size")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("STRING")
                .help("Input prompt"),
        )
        .arg(
            Arg::new("steps")
                .short('n')
                .long("steps")
                .value_name("INT")
                .help("Number of tokens to generate")
                .default_value("100")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// Define the eval subcommand.
fn eval_subcommand() -> Command {
    Command::new("eval")
        .about("Report mean cross-entropy of a checkpoint on corpus batches")
        .arg(
            Arg::new("checkpoint")
                .help("Model checkpoint file (expects <checkpoint>.vocab alongside)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("CORPUS_PATH")
                .help("Path to the raw text corpus")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("batch-size")
                .long("batch-size")
                .value_name("INT")
                .help("Sequences per evaluation batch")
                .default_value("16")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("fraction")
                .long("fraction")
                .value_name("FLOAT")
                .help("Leading fraction of the corpus treated as the training split")
                .default_value("0.9")
                .value_parser(clap::value_parser!(f64)),
        )
        .arg(
            Arg::new("iters")
                .long("iters")
                .value_name("INT")
                .help("Number of batches averaged per split")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .short('s')
                .value_name("INT")
                .help("Seed for batch sampling")
                .default_value("42")
                .value_parser(clap::value_parser!(u64)),
        )
}

/// Run the export command with the provided arguments
fn run_export_command(matches: &ArgMatches) -> Result<()> {
    let corpus_path = matches.get_one::<String>("CORPUS_PATH").unwrap();
    let output_path = matches.get_one::<String>("OUTPUT_PATH").unwrap();
    let seed = *matches.get_one::<u64>("seed").unwrap();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ModelConfig::from_json_file(Path::new(path))?,
        None => ModelConfig {
            vocab_size: 0,
            n_embd: *matches.get_one::<usize>("dim").unwrap(),
            block_size: *matches.get_one::<usize>("context").unwrap(),
            n_layers: *matches.get_one::<usize>("layers").unwrap(),
            n_heads: *matches.get_one::<usize>("heads").unwrap(),
            dropout: *matches.get_one::<f32>("dropout").unwrap(),
        },
    };

    info!("");
    info!("🚀 microgpt model exporter");
    info!("📁 Corpus path: {corpus_path}");
    info!("💾 Output path: {output_path}\n");

    let lines = load_corpus(Path::new(corpus_path))?;
    let vocab = Vocabulary::build(&lines);
    anyhow::ensure!(!vocab.is_empty(), "Corpus produced an empty vocabulary");
    info!("Built vocabulary of {} words", vocab.len());

    config.vocab_size = vocab.len();
    let model = LanguageModel::new(config, seed)?;

    save_checkpoint(&model, Path::new(output_path))?;
    vocab.save(Path::new(&format!("{output_path}.vocab")))?;
    info!("Written vocabulary sidecar to {output_path}.vocab");

    Ok(())
}

/// Run the generate command with the provided arguments
fn run_generate_command(matches: &ArgMatches) -> Result<()> {
    let config = GenerationConfig::builder()
        .checkpoint_path(matches.get_one::<String>("checkpoint"))
        .temperature(matches.get_one::<f32>("temperature").copied())
        .topp(matches.get_one::<f32>("topp").copied())
        .ctx_length(matches.get_one::<usize>("context").copied())
        .prompt(matches.get_one::<String>("input"))
        .max_new_tokens(matches.get_one::<usize>("steps").copied())
        .seed(matches.get_one::<u64>("seed").copied())
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    let vocab_path = format!("{}.vocab", config.checkpoint_path);
    let vocab = Vocabulary::load(Path::new(&vocab_path))?;

    run_session(
        config,
        |text| vocab.encode(text),
        |ids| vocab.decode(ids),
    )
    .map_err(|e| anyhow::anyhow!("Generation failed: {e}"))?;

    Ok(())
}

/// Run the eval command with the provided arguments
fn run_eval_command(matches: &ArgMatches) -> Result<()> {
    let checkpoint_path = matches.get_one::<String>("checkpoint").unwrap();
    let corpus_path = matches.get_one::<String>("CORPUS_PATH").unwrap();
    let batch_size = *matches.get_one::<usize>("batch-size").unwrap();
    let fraction = *matches.get_one::<f64>("fraction").unwrap();
    let iters = *matches.get_one::<usize>("iters").unwrap();
    let seed = *matches.get_one::<u64>("seed").unwrap();

    let mut model = load_checkpoint(Path::new(checkpoint_path), None, seed)?;

    let vocab_path = format!("{checkpoint_path}.vocab");
    let vocab = Vocabulary::load(Path::new(&vocab_path))?;
    anyhow::ensure!(
        vocab.len() == model.config().vocab_size,
        "Vocabulary has {} words but the checkpoint was built for {}",
        vocab.len(),
        model.config().vocab_size
    );

    let lines = load_corpus(Path::new(corpus_path))?;
    let tokens = encode_corpus(&vocab, &lines)?;
    let (train, val) = split_tokens(&tokens, fraction);

    let block_size = model.config().block_size;
    let mut rng = Rng::new(seed);

    for (split, data) in [("train", &train), ("val", &val)] {
        if data.len() <= block_size {
            warn!("Skipping {split} split: {} tokens is too few for windows of {block_size}", data.len());
            continue;
        }

        let mut total_loss = 0.0;
        for _ in 0..iters {
            let (x, y) = sample_batch(data, batch_size, block_size, &mut rng)?;
            let (_, loss) = model.forward(&x, Some(&y))?;
            total_loss += f64::from(loss.expect("targets were supplied"));
        }

        println!("{split} loss: {:.4}", total_loss / iters as f64);
    }

    Ok(())
}

fn execute_commands() -> Result<()> {
    // Initialize logger with clean format (no timestamp/module prefix)
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{}", record.args())
        })
        .init();

    let matches = Command::new("microgpt")
        .about("microgpt CLI: an educational word-level GPT for forward inference and sampling")
        .subcommand(export_subcommand())
        .subcommand(generate_subcommand())
        .subcommand(eval_subcommand())
        .get_matches();

    match matches.subcommand() {
        Some(("export", matches)) => run_export_command(matches),
        Some(("generate", matches)) => run_generate_command(matches),
        Some(("eval", matches)) => run_eval_command(matches),
        _ => anyhow::bail!("No subcommand specified. Use -h to print help information."),
    }
}

fn main() {
    if let Err(e) = execute_commands() {
        error!("Error: {e}");
        std::process::exit(1);
    }
}
