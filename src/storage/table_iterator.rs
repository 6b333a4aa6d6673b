use log::error;

use crate::{
    record::{Row, RowId},
    storage::table_heap::TableHeap,
};

/// Forward cursor over the live tuples of a table heap, materialising
/// one `Row` per step.
pub struct TableIterator<'a> {
    heap: &'a TableHeap,
    next_rid: Option<RowId>,
}

impl<'a> TableIterator<'a> {
    pub fn new(heap: &'a TableHeap) -> Self {
        let next_rid = match heap.first_live_rid() {
            Ok(rid) => rid,
            Err(e) => {
                error!("table iterator failed to locate the first tuple: {}", e);
                None
            }
        };
        Self { heap, next_rid }
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        let rid = self.next_rid.take()?;

        let row = match self.heap.get_tuple(&rid) {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                error!("table iterator failed to read {}: {}", rid, e);
                return None;
            }
        };

        self.next_rid = match self.heap.next_live_rid(&rid) {
            Ok(rid) => rid,
            Err(e) => {
                error!("table iterator failed to advance from {}: {}", rid, e);
                None
            }
        };
        Some(row)
    }
}
