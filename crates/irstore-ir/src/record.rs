use std::ptr::NonNull;

/// Physical layout of every uniqued record: a category header followed by
/// the class-specific payload.
///
/// `repr(C)` pins the header at offset zero, so a pointer to the record is
/// also a valid pointer to its header. Erased handles keep such a pointer
/// and cast back to the full record once the class has been checked.
#[repr(C)]
pub struct Record<H, P> {
    pub(crate) header: H,
    pub(crate) payload: P,
}

impl<H, P> Record<H, P> {
    pub fn header(&self) -> &H {
        &self.header
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Header pointer carrying the provenance of the whole record.
    pub(crate) fn header_ptr(&self) -> NonNull<H> {
        NonNull::from(self).cast()
    }
}

/// # Safety
///
/// `header` must come from `Record::header_ptr` on a `Record<H, P>` that is
/// live for `'r`.
pub(crate) unsafe fn payload_of<'r, H, P>(header: NonNull<H>) -> &'r P
where
    H: 'r,
    P: 'r,
{
    unsafe { &header.cast::<Record<H, P>>().as_ref().payload }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pointer_round_trips_to_payload() {
        let record = Record {
            header: 7u8,
            payload: [1u64, 2, 3],
        };
        let header = record.header_ptr();
        assert_eq!(unsafe { *header.as_ref() }, 7);
        let payload: &[u64; 3] = unsafe { payload_of::<u8, [u64; 3]>(header) };
        assert_eq!(payload, &[1, 2, 3]);
    }
}
