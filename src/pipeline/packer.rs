use anyhow::{Result, bail};

use crate::models::{Dialog, OrderLen, Pack};

/// Measure dialogs for packing
pub fn measure(dialogs: &[Dialog]) -> Vec<OrderLen> {
    dialogs
        .iter()
        .enumerate()
        .map(|(idx, d)| OrderLen {
            idx,
            order: d.order,
            len: d.char_len(),
        })
        .collect()
}

/// Group dialogs into order-preserving packs bounded by `threshold`
/// characters.
///
/// A single left-to-right greedy pass: an item that alone exceeds the
/// threshold becomes its own `oversized` pack; otherwise items accumulate
/// until the next one would overflow, at which point the running pack is
/// flushed. Packs partition the input exactly, in order. This is not optimal
/// bin-packing; reading order must be preserved so each chunk stays
/// temporally coherent.
pub fn pack(items: &[OrderLen], threshold: usize) -> Result<Vec<Pack>> {
    if threshold == 0 {
        bail!("chunk character threshold must be positive");
    }

    let mut packs = Vec::new();
    let mut running = Pack {
        indices: Vec::new(),
        orders: Vec::new(),
        total_len: 0,
        oversized: false,
    };

    for item in items {
        if item.len > threshold {
            flush(&mut packs, &mut running);
            packs.push(Pack {
                indices: vec![item.idx],
                orders: vec![item.order],
                total_len: item.len,
                oversized: true,
            });
            continue;
        }
        if running.total_len + item.len > threshold && !running.is_empty() {
            flush(&mut packs, &mut running);
        }
        running.indices.push(item.idx);
        running.orders.push(item.order);
        running.total_len += item.len;
    }
    flush(&mut packs, &mut running);

    Ok(packs)
}

fn flush(packs: &mut Vec<Pack>, running: &mut Pack) {
    if running.is_empty() {
        return;
    }
    packs.push(std::mem::replace(
        running,
        Pack {
            indices: Vec::new(),
            orders: Vec::new(),
            total_len: 0,
            oversized: false,
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(lens: &[usize]) -> Vec<OrderLen> {
        lens.iter()
            .enumerate()
            .map(|(i, &len)| OrderLen {
                idx: i,
                order: i as u64,
                len,
            })
            .collect()
    }

    #[test]
    fn test_small_meeting_fits_one_pack() {
        let lens = [243, 40, 157, 50, 69, 108, 61, 79, 169, 405, 126, 55, 180, 37];
        let packs = pack(&items(&lens), 10_000).unwrap();

        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].indices, (0..14).collect::<Vec<_>>());
        assert_eq!(packs[0].total_len, 1779);
        assert!(!packs[0].oversized);
    }

    #[test]
    fn test_oversized_dialog_becomes_its_own_pack() {
        let packs = pack(&items(&[12_000]), 10_000).unwrap();

        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].indices, vec![0]);
        assert!(packs[0].oversized);
    }

    #[test]
    fn test_oversized_flushes_running_pack_first() {
        let packs = pack(&items(&[100, 200, 12_000, 300]), 10_000).unwrap();

        assert_eq!(packs.len(), 3);
        assert_eq!(packs[0].indices, vec![0, 1]);
        assert!(packs[1].oversized);
        assert_eq!(packs[1].indices, vec![2]);
        assert_eq!(packs[2].indices, vec![3]);
    }

    #[test]
    fn test_overflow_starts_new_pack() {
        let packs = pack(&items(&[600, 500, 400]), 1_000).unwrap();

        assert_eq!(packs.len(), 2);
        assert_eq!(packs[0].indices, vec![0]);
        assert_eq!(packs[1].indices, vec![1, 2]);
        assert_eq!(packs[1].total_len, 900);
    }

    #[test]
    fn test_packs_partition_input_exactly() {
        let lens: Vec<usize> = (0..200).map(|i| (i * 37) % 900 + 1).collect();
        let packs = pack(&items(&lens), 2_000).unwrap();

        let mut seen = Vec::new();
        for p in &packs {
            assert!(
                p.total_len <= 2_000 || (p.oversized && p.indices.len() == 1),
                "pack violates threshold: {:?}",
                p
            );
            assert_eq!(p.indices.len(), p.orders.len());
            seen.extend_from_slice(&p.indices);
        }
        assert_eq!(seen, (0..lens.len()).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_threshold_is_config_error() {
        assert!(pack(&items(&[10]), 0).is_err());
    }

    #[test]
    fn test_empty_input_yields_no_packs() {
        assert!(pack(&[], 100).unwrap().is_empty());
    }

    #[test]
    fn test_exact_fit_stays_in_pack() {
        let packs = pack(&items(&[500, 500]), 1_000).unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].total_len, 1_000);
    }
}
