//! Render target planning.
//!
//! Nodes draw into slots grouped by target class (format plus attachment
//! count). A slot is live from the node that writes it until its last
//! consumer has executed; after that point a later node of the same class may
//! take the slot over. Planning runs over the flattened execution order, so
//! reuse never hands a slot to a node that runs before the previous owner's
//! consumers.

use crate::format::TextureFormat;

/// Target class plus the node assignments computed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSpec {
    pub format: TextureFormat,
    pub attachments: usize,
}

/// One entry per node, in execution order. `release_at` is the index of the
/// node's last consumer, or `usize::MAX` when the node feeds a graph output
/// and its slot must stay live for the whole tick.
#[derive(Debug, Clone, Copy)]
pub struct NodeDemand {
    pub format: TextureFormat,
    pub attachments: usize,
    pub release_at: usize,
}

/// Result of planning: the slots to allocate and, per node, which slot it
/// draws into.
#[derive(Debug, Clone)]
pub struct TargetPlan {
    pub slots: Vec<SlotSpec>,
    pub assignments: Vec<usize>,
}

pub fn plan(demands: &[NodeDemand]) -> TargetPlan {
    let mut slots: Vec<SlotSpec> = Vec::new();
    let mut busy_until: Vec<usize> = Vec::new();
    let mut assignments = Vec::with_capacity(demands.len());

    for (index, demand) in demands.iter().enumerate() {
        let reusable = slots.iter().enumerate().position(|(slot, spec)| {
            busy_until[slot] < index
                && spec.format == demand.format
                && spec.attachments == demand.attachments
        });
        let slot = match reusable {
            Some(slot) => {
                busy_until[slot] = demand.release_at;
                slot
            }
            None => {
                slots.push(SlotSpec {
                    format: demand.format,
                    attachments: demand.attachments,
                });
                busy_until.push(demand.release_at);
                slots.len() - 1
            }
        };
        assignments.push(slot);
    }

    TargetPlan { slots, assignments }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{ChannelLayout, SampleDepth};

    fn rgba8() -> TextureFormat {
        TextureFormat::new(8, 8, ChannelLayout::Rgba, SampleDepth::UnsignedByte)
    }

    fn demand(format: TextureFormat, release_at: usize) -> NodeDemand {
        NodeDemand {
            format,
            attachments: 1,
            release_at,
        }
    }

    #[test]
    fn chain_reuses_released_slots() {
        // a -> b -> c, c feeds the output. a's slot frees after b runs, so c
        // can take it; b's slot is still live while c draws.
        let fmt = rgba8();
        let plan = plan(&[demand(fmt, 1), demand(fmt, 2), demand(fmt, usize::MAX)]);
        assert_eq!(plan.slots.len(), 2);
        assert_eq!(plan.assignments, [0, 1, 0]);
    }

    #[test]
    fn output_slots_are_never_reused() {
        let fmt = rgba8();
        let plan = plan(&[
            demand(fmt, usize::MAX),
            demand(fmt, usize::MAX),
            demand(fmt, usize::MAX),
        ]);
        assert_eq!(plan.slots.len(), 3);
    }

    #[test]
    fn classes_do_not_mix() {
        let small = rgba8();
        let large = TextureFormat::new(32, 32, ChannelLayout::Rgba, SampleDepth::UnsignedByte);
        let plan = plan(&[demand(small, 1), demand(large, 2), demand(small, 3)]);
        // The released small slot matches node 2; the large one never does.
        assert_eq!(plan.slots.len(), 2);
        assert_eq!(plan.assignments, [0, 1, 0]);
    }

    #[test]
    fn attachment_count_is_part_of_the_class() {
        let fmt = rgba8();
        let a = NodeDemand {
            format: fmt,
            attachments: 2,
            release_at: 1,
        };
        let plan = plan(&[a, demand(fmt, 2), demand(fmt, 3)]);
        assert_eq!(plan.slots.len(), 3);
    }
}
