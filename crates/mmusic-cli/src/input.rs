//! Input mode handling for the TUI.
//!
//! Manages the current input mode (Normal or a search prompt) and provides
//! a bounded buffer for typing the pattern.

use crate::search::Direction;


/// Most characters a prompt accepts.
pub const MAX_INPUT_CHARS: usize = 256;


/// Current input mode of the application.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum InputMode {
    /// Normal mode - keyboard shortcuts active.
    #[default]
    Normal,

    /// Typing a search pattern; Enter searches in this direction.
    Search( Direction ),
}


/// Input buffer for prompt text entry.
///
/// The cursor is a byte offset that always sits on a char boundary.
#[derive( Debug, Default )]
pub struct InputBuffer {
    content: String,
    cursor: usize,
}


impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }


    /// Inserts a character at the cursor position. Returns false when the
    /// buffer is full.
    pub fn insert( &mut self, c: char ) -> bool {
        if self.content.chars().count() >= MAX_INPUT_CHARS {
            return false;
        }
        self.content.insert( self.cursor, c );
        self.cursor += c.len_utf8();
        true
    }


    /// Deletes the character before the cursor.
    pub fn backspace( &mut self ) {
        if self.cursor > 0 {
            let prev = self.prev_boundary();
            self.content.remove( prev );
            self.cursor = prev;
        }
    }


    /// Deletes the character at the cursor position.
    pub fn delete( &mut self ) {
        if self.cursor < self.content.len() {
            self.content.remove( self.cursor );
        }
    }


    pub fn clear( &mut self ) {
        self.content.clear();
        self.cursor = 0;
    }


    /// Empties the buffer and returns what it held.
    pub fn take( &mut self ) -> String {
        self.cursor = 0;
        std::mem::take( &mut self.content )
    }


    pub fn content( &self ) -> &str {
        &self.content
    }


    /// Gets the cursor position as character count (for display).
    pub fn cursor_char_pos( &self ) -> usize {
        self.content[ ..self.cursor ].chars().count()
    }


    fn prev_boundary( &self ) -> usize {
        self.content[ ..self.cursor ]
            .char_indices()
            .last()
            .map( |( i, _ )| i )
            .unwrap_or( 0 )
    }


    pub fn move_left( &mut self ) {
        if self.cursor > 0 {
            self.cursor = self.prev_boundary();
        }
    }


    pub fn move_right( &mut self ) {
        if self.cursor < self.content.len() {
            self.cursor = self.content[ self.cursor.. ]
                .char_indices()
                .nth( 1 )
                .map( |( i, _ )| self.cursor + i )
                .unwrap_or( self.content.len() );
        }
    }


    pub fn move_home( &mut self ) {
        self.cursor = 0;
    }


    pub fn move_end( &mut self ) {
        self.cursor = self.content.len();
    }


    pub fn is_empty( &self ) -> bool {
        self.content.is_empty()
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn typed( text: &str ) -> InputBuffer {
        let mut buf = InputBuffer::new();
        for c in text.chars() {
            buf.insert( c );
        }
        buf
    }


    #[test]
    fn test_edits_work_on_characters() {
        let mut buf = typed( "añb" );
        buf.move_left();
        buf.move_left();
        assert_eq!( buf.cursor_char_pos(), 1 );

        buf.delete();
        assert_eq!( buf.content(), "ab" );

        buf.move_right();
        buf.insert( 'é' );
        buf.backspace();
        buf.backspace();
        assert_eq!( buf.content(), "a" );
    }


    #[test]
    fn test_insert_in_the_middle() {
        let mut buf = typed( "ac" );
        buf.move_home();
        buf.move_right();
        buf.insert( 'b' );
        buf.move_end();
        buf.insert( 'd' );
        assert_eq!( buf.content(), "abcd" );
    }


    #[test]
    fn test_buffer_is_bounded() {
        let mut buf = typed( &"ü".repeat( MAX_INPUT_CHARS ) );
        assert!( !buf.insert( 'x' ) );
        assert_eq!( buf.content().chars().count(), MAX_INPUT_CHARS );
    }


    #[test]
    fn test_take_empties() {
        let mut buf = typed( "rock" );
        assert_eq!( buf.take(), "rock" );
        assert!( buf.is_empty() );
        assert_eq!( buf.cursor_char_pos(), 0 );
    }
}
