/// Pagination descriptor for a paged view.
///
/// The total is unknown until the first page arrives; until then only the
/// lower bound of the page range is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
  total_items: Option<u64>,
  page_size: u32,
  current_page: u32,
}

impl Pagination {
  pub fn new(page_size: u32) -> Self {
    Self {
      total_items: None,
      page_size: page_size.max(1),
      current_page: 1,
    }
  }

  pub fn total_items(&self) -> Option<u64> {
    self.total_items
  }

  pub fn page_size(&self) -> u32 {
    self.page_size
  }

  pub fn current_page(&self) -> u32 {
    self.current_page
  }

  /// ceil(total / page_size), never less than one page.
  pub fn total_pages(&self) -> Option<u32> {
    self.total_items.map(|total| {
      let size = u64::from(self.page_size);
      let pages = total.div_ceil(size).max(1);
      u32::try_from(pages).unwrap_or(u32::MAX)
    })
  }

  pub fn has_next(&self) -> bool {
    match self.total_pages() {
      Some(pages) => self.current_page < pages,
      None => false,
    }
  }

  pub fn has_previous(&self) -> bool {
    self.current_page > 1
  }

  /// Clamp a requested page into the valid range.
  pub fn clamp(&self, page: u32) -> u32 {
    let page = page.max(1);
    match self.total_pages() {
      Some(pages) => page.min(pages),
      None => page,
    }
  }

  /// Move to `page` (clamped) and return where we landed.
  pub fn go_to(&mut self, page: u32) -> u32 {
    self.current_page = self.clamp(page);
    self.current_page
  }

  /// Record a freshly reported total. Returns true if the current page had
  /// to be pulled back into range.
  pub fn set_total_items(&mut self, total: u64) -> bool {
    self.total_items = Some(total);
    let clamped = self.clamp(self.current_page);
    let moved = clamped != self.current_page;
    self.current_page = clamped;
    moved
  }

  /// Change the page size, recomputing the page count and clamping.
  pub fn set_page_size(&mut self, page_size: u32) {
    self.page_size = page_size.max(1);
    self.current_page = self.clamp(self.current_page);
  }

  /// Forget the total and return to the first page.
  pub fn reset(&mut self) {
    self.total_items = None;
    self.current_page = 1;
  }
}
