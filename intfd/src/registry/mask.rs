//! Bitmask over registry slots

/// Set of subscribers, indexed by registration slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberMask {
    words: Vec<u64>,
}

impl SubscriberMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: usize) {
        let (word, bit) = (slot / 64, slot % 64);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << bit;
    }

    /// Clear `slot`, returning whether it was set
    pub fn remove(&mut self, slot: usize) -> bool {
        let (word, bit) = (slot / 64, slot % 64);
        match self.words.get_mut(word) {
            Some(w) if *w & (1 << bit) != 0 => {
                *w &= !(1 << bit);
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.words.get(slot / 64).is_some_and(|w| w & (1 << (slot % 64)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Set slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, w)| {
            (0..64).filter(move |bit| w & (1u64 << bit) != 0).map(move |bit| i * 64 + bit)
        })
    }
}

impl FromIterator<usize> for SubscriberMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::new();
        for slot in iter {
            mask.insert(slot);
        }
        mask
    }
}
