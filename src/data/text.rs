use super::dataloader::BatchSource;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::Path;

pub const PAD: usize = 0;
pub const BOS: usize = 1;
pub const EOS: usize = 2;
pub const UNK: usize = 3;

/// Vocabulary built from the training split, with fixed special ids.
pub struct Vocab {
    word2id: HashMap<String, usize>,
    id2word: Vec<String>,
}

impl Vocab {
    fn new() -> Self {
        let specials = ["<pad>", "<s>", "</s>", "<unk>"];
        let mut word2id = HashMap::new();
        let mut id2word = Vec::new();
        for s in specials {
            word2id.insert(s.to_string(), id2word.len());
            id2word.push(s.to_string());
        }
        Self { word2id, id2word }
    }

    fn from_corpus(sents: &[Vec<String>]) -> Self {
        let mut vocab = Self::new();
        for sent in sents {
            for w in sent {
                if !vocab.word2id.contains_key(w) {
                    vocab.word2id.insert(w.clone(), vocab.id2word.len());
                    vocab.id2word.push(w.clone());
                }
            }
        }
        vocab
    }

    pub fn len(&self) -> usize {
        self.id2word.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2word.is_empty()
    }

    pub fn id(&self, w: &str) -> usize {
        self.word2id.get(w).copied().unwrap_or(UNK)
    }

    pub fn word(&self, id: usize) -> &str {
        &self.id2word[id]
    }
}

/// One split of a text corpus: `<s> .. </s>`-delimited id sequences, chunked
/// into same-length batches so no padding is needed.
pub struct TextSplit {
    sents: Vec<Vec<usize>>,
    chunks: Vec<Vec<usize>>, // index groups, one per batch
}

impl TextSplit {
    fn new(sents: Vec<Vec<usize>>, batch_size: usize) -> Self {
        // bucket by length, then chunk each bucket
        let mut buckets: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (i, s) in sents.iter().enumerate() {
            buckets.entry(s.len()).or_default().push(i);
        }
        let mut chunks = Vec::new();
        for idxs in buckets.values() {
            for chunk in idxs.chunks(batch_size) {
                chunks.push(chunk.to_vec());
            }
        }
        Self { sents, chunks }
    }

    fn build_batch(&self, chunk: &[usize]) -> Vec<Vec<usize>> {
        chunk.iter().map(|&i| self.sents[i].clone()).collect()
    }
}

impl BatchSource for TextSplit {
    type Batch = Vec<Vec<usize>>;

    fn num_examples(&self) -> usize {
        self.sents.len()
    }

    fn num_batches(&self) -> usize {
        self.chunks.len()
    }

    fn epoch_batches(&self, rng: &mut StdRng) -> Vec<Vec<Vec<usize>>> {
        let mut order: Vec<usize> = (0..self.chunks.len()).collect();
        order.shuffle(rng);
        order
            .into_iter()
            .map(|i| self.build_batch(&self.chunks[i]))
            .collect()
    }

    fn sample_batch(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let i = rng.gen_range(0..self.chunks.len());
        self.build_batch(&self.chunks[i])
    }

    fn batch_examples(batch: &Vec<Vec<usize>>) -> usize {
        batch.len()
    }
}

/// Train/val/test splits plus the vocabulary for a text dataset.
pub struct TextData {
    pub vocab: Vocab,
    pub train: TextSplit,
    pub val: TextSplit,
    pub test: TextSplit,
}

impl TextData {
    /// Load `<dataset>.{train,valid,test}.txt` from `data_dir`, one
    /// whitespace-tokenized sentence per line.  The vocabulary comes from
    /// the training split; out-of-vocabulary words map to `<unk>`.
    pub fn load(dataset: &str, data_dir: &str, batch_size: usize) -> io::Result<Self> {
        let dir = Path::new(data_dir);
        let train_words = read_corpus(&dir.join(format!("{dataset}.train.txt")))?;
        let vocab = Vocab::from_corpus(&train_words);
        let train = to_ids(&train_words, &vocab);
        let val = to_ids(
            &read_corpus(&dir.join(format!("{dataset}.valid.txt")))?,
            &vocab,
        );
        let test = to_ids(
            &read_corpus(&dir.join(format!("{dataset}.test.txt")))?,
            &vocab,
        );
        Ok(Self {
            vocab,
            train: TextSplit::new(train, batch_size),
            val: TextSplit::new(val, batch_size),
            test: TextSplit::new(test, batch_size),
        })
    }
}

fn read_corpus(path: &Path) -> io::Result<Vec<Vec<String>>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.split_whitespace().map(str::to_string).collect())
        .collect())
}

fn to_ids(sents: &[Vec<String>], vocab: &Vocab) -> Vec<Vec<usize>> {
    sents
        .iter()
        .map(|words| {
            let mut ids = Vec::with_capacity(words.len() + 2);
            ids.push(BOS);
            ids.extend(words.iter().map(|w| vocab.id(w)));
            ids.push(EOS);
            ids
        })
        .collect()
}
