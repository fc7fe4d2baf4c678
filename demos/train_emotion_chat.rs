/// Train the emotion-conditioned chatbot on subtitle dialogue
///
/// Usage:
///   cargo run --example train_emotion_chat -- <dialogue.txt> <emotion.txt> [test.txt test_emotion.txt]
///
/// Set `EMOTION_CHAT_CUDA=1` to train on the first CUDA device.
use emotion_chat::data::{PairDataset, PairLoader, Vocabulary};
use emotion_chat::training::{Trainer, TrainingConfig};
use emotion_chat::utils::{count_varmap_parameters, select_device};
use emotion_chat::{Emotion, Seq2SeqConfig};

fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("=== Emotion seq2seq chatbot - training ===");

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() != 2 && args.len() != 4 {
        anyhow::bail!("expected <dialogue> <emotions> [<test dialogue> <test emotions>]");
    }

    let device = select_device(std::env::var("EMOTION_CHAT_CUDA").is_ok())?;
    log::info!("Using device: {:?}", device);

    // Vocabulary from the training dialogue only
    let dialogue = std::fs::read_to_string(&args[0])?;
    let vocab = Vocabulary::build(dialogue.lines(), 10000);

    let model_config = Seq2SeqConfig {
        vocab_size: vocab.len(),
        ..Default::default()
    };
    log::info!("Model configuration: {:#?}", model_config);

    let train_set = PairDataset::from_dialogue(&args[0], &args[1], &vocab, model_config.max_length)?;
    let test_pairs = if args.len() == 4 {
        PairDataset::from_dialogue(&args[2], &args[3], &vocab, model_config.max_length)?
            .pairs()
            .to_vec()
    } else {
        Vec::new()
    };

    log::info!("Dataset loaded:");
    log::info!("  - Training pairs: {}", train_set.len());
    log::info!("  - Test pairs: {}", test_pairs.len());
    log::info!("  - Vocab size: {}", vocab.len());

    let training_config = TrainingConfig::default();
    log::info!("Training configuration: {:#?}", training_config);

    let mut loader = PairLoader::new(train_set, false, training_config.seed);
    let mut trainer = Trainer::new(model_config, training_config, device)?;
    log::info!(
        "Parameters: ~{:.2}M",
        count_varmap_parameters(trainer.varmap()) as f64 / 1_000_000.0
    );

    let history = trainer.train(&mut loader, &test_pairs, &vocab)?;
    log::info!(
        "Recorded {} train losses and {} test losses",
        history.train_losses.len(),
        history.test_losses.len()
    );

    // Sample replies to the first utterance under every emotion
    if let Some(pair) = loader.dataset().get(0) {
        log::info!("> {}", vocab.decode(&pair.input));
        for emotion in Emotion::ALL {
            let reply = trainer.respond(&pair.input, emotion)?;
            log::info!("[{}] {}", emotion, vocab.decode(&reply.tokens));
        }
    }

    Ok(())
}
