use crate::{domain::Positioned, errors::Error, Result};

/// Items that survived the watermark cut, oldest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection<I: Positioned> {
    pub items: Vec<I>,
    /// Greatest position newer than the watermark, deliverable or not.
    pub horizon: Option<I::Position>,
}

impl<I: Positioned> Selection<I> {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.horizon.is_none()
    }
}

/// Keep items strictly newer than `watermark`, sorted ascending.
///
/// Duplicate positions among the new items are a protocol violation and fail
/// the fetch rather than picking one arbitrarily.
pub fn select_new<I: Positioned>(
    watermark: Option<&I::Position>,
    items: Vec<I>,
) -> Result<Selection<I>> {
    let mut fresh: Vec<I> = items
        .into_iter()
        .filter(|it| watermark.map_or(true, |w| it.position() > w))
        .collect();

    fresh.sort_by(|a, b| a.position().cmp(b.position()));

    if let Some(pair) = fresh
        .windows(2)
        .find(|pair| pair[0].position() == pair[1].position())
    {
        return Err(Error::Fetch(format!(
            "duplicate position {} in upstream response",
            pair[0].position()
        )));
    }

    let horizon = fresh.last().map(|it| it.position().clone());
    fresh.retain(|it| it.is_deliverable());

    Ok(Selection {
        items: fresh,
        horizon,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InlineQuery, Question, UnixTime, Update, UpdateId, UpdateKind};

    fn q(pos: i64) -> Question<UnixTime> {
        Question {
            position: UnixTime(pos),
            title: format!("t{pos}"),
            link: format!("http://x/{pos}"),
            question_id: Some(pos as u64),
        }
    }

    fn positions(sel: &Selection<Question<UnixTime>>) -> Vec<i64> {
        sel.items.iter().map(|i| i.position.0).collect()
    }

    #[test]
    fn keeps_everything_without_watermark_sorted() {
        let sel = select_new(None, vec![q(3), q(1), q(2)]).unwrap();
        assert_eq!(positions(&sel), vec![1, 2, 3]);
        assert_eq!(sel.horizon, Some(UnixTime(3)));
    }

    #[test]
    fn drops_items_at_or_below_watermark() {
        let sel = select_new(Some(&UnixTime(5)), vec![q(4), q(5), q(6)]).unwrap();
        assert_eq!(positions(&sel), vec![6]);
    }

    #[test]
    fn filtering_is_idempotent() {
        let w = UnixTime(2);
        let input = vec![q(5), q(1), q(3), q(2)];
        let once = select_new(Some(&w), input).unwrap();
        let twice = select_new(Some(&w), once.items.clone()).unwrap();
        assert_eq!(once, twice);

        // After a successful cycle the horizon becomes the watermark.
        let next = once.horizon.unwrap();
        let after = select_new(Some(&next), once.items).unwrap();
        assert!(after.is_empty());
    }

    #[test]
    fn duplicate_new_positions_are_a_fetch_error() {
        let err = select_new(None, vec![q(7), q(7)]).unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
    }

    #[test]
    fn duplicates_below_watermark_are_ignored() {
        let sel = select_new(Some(&UnixTime(7)), vec![q(7), q(7), q(8)]).unwrap();
        assert_eq!(positions(&sel), vec![8]);
    }

    #[test]
    fn non_inline_updates_are_dropped_but_move_the_horizon() {
        let updates = vec![
            Update {
                update_id: UpdateId(12),
                kind: UpdateKind::Ignored,
            },
            Update {
                update_id: UpdateId(11),
                kind: UpdateKind::InlineQuery(InlineQuery {
                    query_id: "a".into(),
                    query_text: "saluton".into(),
                }),
            },
        ];
        let sel = select_new(Some(&UpdateId(10)), updates).unwrap();
        assert_eq!(sel.items.len(), 1);
        assert_eq!(sel.items[0].update_id, UpdateId(11));
        assert_eq!(sel.horizon, Some(UpdateId(12)));
    }
}
