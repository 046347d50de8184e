use crate::types::GarmentRecommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryOnChange {
    Selected,
    Replaced,
    Cleared,
}

/// The garment currently projected onto the torso, if any.
#[derive(Debug, Clone, Default)]
pub struct TryOnSelection {
    active: Option<GarmentRecommendation>,
}

impl TryOnSelection {
    pub fn active(&self) -> Option<&GarmentRecommendation> {
        self.active.as_ref()
    }

    pub fn is_active(&self, id: u64) -> bool {
        self.active.as_ref().is_some_and(|g| g.id == id)
    }

    /// Same id clears; anything else takes over the slot.
    pub fn toggle(&mut self, garment: &GarmentRecommendation) -> TryOnChange {
        match &self.active {
            Some(current) if current.id == garment.id => {
                self.active = None;
                TryOnChange::Cleared
            }
            Some(_) => {
                self.active = Some(garment.clone());
                TryOnChange::Replaced
            }
            None => {
                self.active = Some(garment.clone());
                TryOnChange::Selected
            }
        }
    }
}
