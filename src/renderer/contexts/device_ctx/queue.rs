use ash::vk;
use smallvec::SmallVec;

/// Queue family indices the renderer submits and presents on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Prefers a single family that can both render and present. Otherwise falls
    /// back to the first graphics family paired with the first presenting family.
    pub fn select<F>(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: F,
    ) -> Option<Self>
    where
        F: FnMut(u32) -> bool,
    {
        let supports_graphics = |q: &vk::QueueFamilyProperties| {
            q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        };
        let present = families
            .iter()
            .enumerate()
            .map(|(i, q)| q.queue_count > 0 && supports_present(i as u32))
            .collect::<SmallVec<[bool; 8]>>();

        if let Some(i) = families
            .iter()
            .enumerate()
            .position(|(i, q)| supports_graphics(q) && present[i])
        {
            return Some(Self {
                graphics: i as u32,
                present: i as u32,
            });
        }

        let graphics = families.iter().position(supports_graphics)?;
        let present = present.iter().position(|p| *p)?;
        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> SmallVec<[u32; 2]> {
        let mut families = SmallVec::new();
        families.push(self.graphics);
        if !self.is_shared() {
            families.push(self.present);
        }
        families
    }

    /// Sharing mode for images touched by both queues.
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.is_shared() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Queue {
    pub family_index: u32,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(family_index: u32, handle: vk::Queue) -> Self {
        Self {
            family_index,
            handle,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Queues {
    pub graphics: Queue,
    pub present: Queue,
}

impl Queues {
    pub fn families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics: self.graphics.family_index,
            present: self.present.family_index,
        }
    }
}
