//! Synthetic single-token mutations
//!
//! Mutations are drawn from a seeded [`StdRng`], so a given seed and file
//! always produce the same edit. Sentinel positions are never touched.

use crate::edit::{Edit, EditKind};
use crate::util::fnv1a;
use crate::vector::TokenVector;
use crate::vocabulary::{Vind, Vocabulary};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct MutationGenerator {
    rng: StdRng,
}

impl MutationGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator whose stream depends only on `seed` and `file_id`, so
    /// results do not depend on the order files are processed in.
    pub fn for_file(seed: u64, file_id: &str) -> Self {
        Self::new(seed ^ fnv1a(file_id.as_bytes()))
    }

    /// Random kind, falling back to the other kinds when the drawn one
    /// has no valid site in `vector`.
    pub fn mutate(&mut self, vector: &TokenVector, vocabulary: &Vocabulary) -> Option<Edit> {
        let kinds = EditKind::all();
        let first = self.rng.random_range(0..kinds.len());
        (0..kinds.len())
            .map(|offset| kinds[(first + offset) % kinds.len()])
            .find_map(|kind| self.generate(kind, vector, vocabulary))
    }

    pub fn generate(
        &mut self,
        kind: EditKind,
        vector: &TokenVector,
        vocabulary: &Vocabulary,
    ) -> Option<Edit> {
        match kind {
            EditKind::Insertion => self.insertion(vector, vocabulary),
            EditKind::Deletion => self.deletion(vector),
            EditKind::Substitution => self.substitution(vector, vocabulary),
        }
    }

    /// Insert a concrete token anywhere between the sentinels.
    pub fn insertion(&mut self, vector: &TokenVector, vocabulary: &Vocabulary) -> Option<Edit> {
        if vector.len() < 2 {
            return None;
        }
        let token = self.concrete_token(vocabulary, None)?;
        let index = self.rng.random_range(1..vector.len());
        Some(Edit::Insertion { index, token })
    }

    /// Delete one token between the sentinels.
    pub fn deletion(&mut self, vector: &TokenVector) -> Option<Edit> {
        let index = self.body_index(vector)?;
        Some(Edit::Deletion {
            index,
            original_token: vector[index],
        })
    }

    /// Replace one token between the sentinels with a different one.
    pub fn substitution(&mut self, vector: &TokenVector, vocabulary: &Vocabulary) -> Option<Edit> {
        let index = self.body_index(vector)?;
        let original_token = vector[index];
        let token = self.concrete_token(vocabulary, Some(original_token))?;
        Some(Edit::Substitution {
            index,
            token,
            original_token,
        })
    }

    fn body_index(&mut self, vector: &TokenVector) -> Option<usize> {
        if vector.len() < 3 {
            return None;
        }
        Some(self.rng.random_range(1..vector.len() - 1))
    }

    /// Uniform over concrete entries other than `except`.
    fn concrete_token(&mut self, vocabulary: &Vocabulary, except: Option<Vind>) -> Option<Vind> {
        let range = vocabulary.concrete_indices();
        let skip = except
            .map(usize::from)
            .filter(|e| range.contains(e));
        let choices = range.len() - usize::from(skip.is_some());
        if choices == 0 {
            return None;
        }
        let mut pick = range.start + self.rng.random_range(0..choices);
        if skip.is_some_and(|s| pick >= s) {
            pick += 1;
        }
        Vind::try_from(pick).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn vocab() -> Vocabulary {
        Vocabulary::from_names(["class", "Hello", "{", "}"]).unwrap()
    }

    #[test]
    fn same_seed_same_mutation() {
        let vocab = vocab();
        let vector = TokenVector::new(vec![1, 3, 4, 5, 6, 2]);
        let a = MutationGenerator::for_file(7, "abc").mutate(&vector, &vocab);
        let b = MutationGenerator::for_file(7, "abc").mutate(&vector, &vocab);
        assert_eq!(a, b);
        assert!(a.is_some());
    }

    #[test]
    fn empty_bodies_only_accept_insertions() {
        let vocab = vocab();
        let vector = TokenVector::new(vec![1, 2]);
        let mut generator = MutationGenerator::new(0);
        assert!(generator.deletion(&vector).is_none());
        assert!(generator.substitution(&vector, &vocab).is_none());
        assert_eq!(
            generator.mutate(&vector, &vocab).map(|e| e.kind()),
            Some(EditKind::Insertion)
        );
    }

    #[test]
    fn single_entry_vocabulary_cannot_substitute() {
        let vocab = Vocabulary::from_names(["x"]).unwrap();
        let vector = TokenVector::new(vec![1, 3, 2]);
        assert!(MutationGenerator::new(1).substitution(&vector, &vocab).is_none());
    }

    proptest! {
        #[test]
        fn mutations_apply_and_spare_sentinels(
            seed in any::<u64>(),
            body in prop::collection::vec(3u8..7, 0..20),
        ) {
            let vocab = vocab();
            let vector = TokenVector::bracketed(&vocab, body);
            let mut generator = MutationGenerator::new(seed);
            for kind in EditKind::all() {
                let Some(edit) = generator.generate(kind, &vector, &vocab) else {
                    continue;
                };
                let mutated = edit.apply(&vector).unwrap();
                prop_assert_eq!(mutated[0], vocab.start_token_index());
                prop_assert_eq!(mutated[mutated.len() - 1], vocab.end_token_index());
                if let Edit::Substitution { token, original_token, .. } = edit {
                    prop_assert_ne!(token, original_token);
                    prop_assert!(vocab.is_concrete(token));
                }
                if let Edit::Insertion { token, .. } = edit {
                    prop_assert!(vocab.is_concrete(token));
                }
            }
        }
    }
}
